//! On-disk cache of downloaded asset files.
//!
//! Every asset revision maps to one or two deterministic file paths: a copy
//! in the shared global directory and, when configured, a copy next to the
//! current project. The first path is the one downloads write to; the last
//! one is what gets linked into a document.
//!
//! # Example
//!
//! ```no_run
//! use hana3d_cache::{check_existing, CacheEntry, CacheLayout, DownloadLocation};
//!
//! fn main() -> Result<(), hana3d_cache::CacheError> {
//!     let layout = CacheLayout::new("/tmp/hana3d".into(), None, DownloadLocation::Global);
//!     let paths = layout.download_paths(&CacheEntry {
//!         kind_dir: "models",
//!         name: "Office Chair",
//!         view_id: "a1b2",
//!         download_url: "https://cdn.example.com/files/chair.blend?sig=1",
//!     });
//!     if check_existing(&paths, Some(1_700_000_000.0))? {
//!         println!("cached at {:?}", paths[0]);
//!     }
//!     Ok(())
//! }
//! ```

mod files;
mod layout;

pub use files::{check_existing, mirror_primary, remove_files, sync_copies, temp_path};
pub use layout::{slugify, CacheEntry, CacheLayout, DownloadLocation};

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while inspecting or maintaining cached files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// Reading file metadata (creation time) failed.
    #[error("Failed to read metadata of {path:?}: {source}")]
    Metadata {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Duplicating a cached file between the global and project copies failed.
    #[error("Failed to copy {from:?} to {to:?}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    /// Removing a stale copy failed.
    #[error("Failed to remove {path:?}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Creating a cache directory failed.
    #[error("Failed to create directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}
