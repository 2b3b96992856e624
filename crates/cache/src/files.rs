//! Existence checks and maintenance of cached asset files.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use log::{debug, info, warn};

use crate::CacheError;

/// Sibling path a download is streamed into before being renamed into place.
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut name = OsString::from(final_path.as_os_str());
    name.push("_tmp");
    PathBuf::from(name)
}

/// Duplicate the file between the global and project copies when only one of
/// them is present. No-op unless exactly two paths are given.
pub fn sync_copies(paths: &[PathBuf]) -> Result<(), CacheError> {
    let [primary, secondary] = paths else {
        return Ok(());
    };

    match (primary.is_file(), secondary.is_file()) {
        (true, false) => copy_file(primary, secondary),
        // Settings changed or the global cache was wiped
        (false, true) => copy_file(secondary, primary),
        _ => Ok(()),
    }
}

/// Overwrite the secondary copy with the freshly downloaded primary.
pub fn mirror_primary(paths: &[PathBuf]) -> Result<(), CacheError> {
    if let [primary, secondary] = paths {
        copy_file(primary, secondary)?;
    }
    Ok(())
}

/// Check whether the asset file is present locally.
///
/// When the server reports a `created` timestamp newer than the local file,
/// every local copy is deleted and the asset is reported as missing so the
/// caller downloads it again.
pub fn check_existing(paths: &[PathBuf], created: Option<f64>) -> Result<bool, CacheError> {
    sync_copies(paths)?;

    let Some(primary) = paths.first() else {
        return Ok(false);
    };
    if !primary.is_file() {
        return Ok(false);
    }

    if let Some(created) = created {
        let local = creation_time(primary)?;
        if created > local {
            info!(
                "Server copy of {:?} is newer ({} > {}), invalidating local files",
                primary, created, local
            );
            for path in paths {
                match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(source) => {
                        return Err(CacheError::Remove {
                            path: path.clone(),
                            source,
                        })
                    }
                }
            }
            return Ok(false);
        }
    }

    Ok(true)
}

/// Best-effort removal of every copy of an asset, including partial downloads.
pub fn remove_files(paths: &[PathBuf]) {
    for path in paths.iter().flat_map(|p| [p.clone(), temp_path(p)]) {
        match fs::remove_file(&path) {
            Ok(()) => debug!("Removed {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Error when removing {:?}: {}", path, e),
        }
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<(), CacheError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|source| CacheError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::copy(from, to).map_err(|source| CacheError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;
    debug!("Copied {:?} to {:?}", from, to);
    Ok(())
}

/// File creation time in seconds since the epoch; modification time on
/// filesystems that do not record creation.
fn creation_time(path: &Path) -> Result<f64, CacheError> {
    let metadata = fs::metadata(path).map_err(|source| CacheError::Metadata {
        path: path.to_path_buf(),
        source,
    })?;
    let time = metadata
        .created()
        .or_else(|_| metadata.modified())
        .map_err(|source| CacheError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0))
}
