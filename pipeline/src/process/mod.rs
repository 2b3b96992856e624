//! External renderer subprocesses and their lifecycle.

mod error;
mod monitor;
mod status;
mod thumbnail;

pub use error::ProcessError;
pub use monitor::{ProcessKind, ProcessMonitor};
pub use status::parse_status_line;
pub use thumbnail::{
    unique_thumbnail_path, ThumbnailJob, ThumbnailKind, ThumbnailRequest, ThumbnailSettings,
};
