//! Working-file management and atomic publish.
//!
//! Only `<destination>.tmp` is mutated while a download runs. The rename in
//! [`publish`] is the single step that makes the destination appear.

use std::io;
use std::path::Path;

use tokio::fs::{self, File};
use tracing::{debug, warn};

use super::error::{DownloadError, DownloadResult};

/// Create the destination's parent directory if needed.
pub(crate) async fn ensure_parent_dir(destination: &Path) -> DownloadResult<()> {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::CreateDirFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })
        }
        _ => Ok(()),
    }
}

/// Open the working file, truncating anything left by a previous attempt.
pub(crate) async fn open_temp_file(path: &Path) -> DownloadResult<File> {
    File::create(path)
        .await
        .map_err(|e| DownloadError::write_failed(path, e))
}

/// Flush the working file to disk and close it.
pub(crate) async fn close_temp_file(file: File, path: &Path) -> DownloadResult<()> {
    file.sync_all()
        .await
        .map_err(|e| DownloadError::write_failed(path, e))
}

/// Rename the completed working file to its final name.
pub(crate) async fn publish(temp: &Path, destination: &Path) -> DownloadResult<()> {
    fs::rename(temp, destination)
        .await
        .map_err(|e| DownloadError::RenameFailed {
            from: temp.to_path_buf(),
            to: destination.to_path_buf(),
            source: e,
        })?;
    debug!(path = %destination.display(), "Published download");
    Ok(())
}

/// Remove the working file after a permanent failure. Best effort.
pub(crate) async fn discard(temp: &Path) {
    match fs::remove_file(temp).await {
        Ok(()) => debug!(path = %temp.display(), "Removed working file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %temp.display(), error = %e, "Failed to remove working file"),
    }
}
