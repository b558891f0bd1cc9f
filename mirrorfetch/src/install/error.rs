//! Error types for post-download installation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::download::DownloadError;

/// Result type for install operations.
pub type InstallResult<T> = Result<T, InstallError>;

/// Errors that can occur while installing a downloaded archive.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The download itself failed.
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("failed to read {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("checksum mismatch for {filename}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    #[error("invalid SHA-256 digest '{0}'")]
    InvalidDigest(String),

    #[error("cannot determine archive format of {}", .0.display())]
    UnknownArchiveFormat(PathBuf),

    #[error("archive {} contains unsafe entry '{entry}'", archive.display())]
    UnsafeEntry { archive: PathBuf, entry: String },

    #[error("failed to extract {}: {reason}", path.display())]
    ExtractionFailed { path: PathBuf, reason: String },

    #[error("failed to write marker {} after {attempts} attempts: {source}", path.display())]
    MarkerFailed {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// A blocking task panicked or was cancelled by the runtime.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

impl InstallError {
    /// Whether the install stopped because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Download(e) if e.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_download_is_detected() {
        let err = InstallError::from(DownloadError::Cancelled);
        assert!(err.is_cancelled());
        assert!(!InstallError::InvalidDigest("x".into()).is_cancelled());
    }

    #[test]
    fn test_mismatch_display() {
        let err = InstallError::ChecksumMismatch {
            filename: "pkg.zip".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch for pkg.zip: expected aa, got bb"
        );
    }
}
