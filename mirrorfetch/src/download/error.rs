//! Error types for the downloader.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while downloading a file.
///
/// Network and protocol failures are recovered by the retry/fallback
/// controller; filesystem failures and cancellation surface immediately.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The request was rejected before any network activity.
    #[error("invalid download request: {0}")]
    InvalidRequest(String),

    /// The HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    ClientSetup(String),

    /// Transport-level failure (connection refused/reset, body read error).
    #[error("request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// The server answered with a status the downloader cannot use.
    #[error("{method} {url} returned status {status}")]
    UnexpectedStatus {
        url: String,
        method: &'static str,
        status: u16,
    },

    /// The response did not match what was requested.
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// The server answered a ranged `GET` with the full body.
    #[error("{url} ignored the Range header")]
    RangesUnsupported { url: String },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Failed to create or write the working file.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to publish the working file under its final name.
    #[error("failed to rename {} to {}: {source}", from.display(), to.display())]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    /// Every URL used up its retry budget.
    #[error("download failed after {attempts} attempts across {urls} URL(s): {last}")]
    Exhausted {
        attempts: u32,
        urls: usize,
        #[source]
        last: Box<DownloadError>,
    },

    /// The download was aborted through its cancellation token.
    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Whether the controller may recover from this error by retrying the
    /// same URL or moving on to a fallback.
    ///
    /// Protocol errors are treated like transient ones: the downloader does
    /// not distinguish response codes beyond success and failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http { .. }
                | Self::Timeout { .. }
                | Self::UnexpectedStatus { .. }
                | Self::MalformedResponse { .. }
                | Self::RangesUnsupported { .. }
        )
    }

    /// Whether this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The error that ended the last attempt, unwrapping exhaustion.
    pub fn last_cause(&self) -> &DownloadError {
        match self {
            Self::Exhausted { last, .. } => last.last_cause(),
            other => other,
        }
    }

    pub(crate) fn write_failed(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::WriteFailed {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn ranges_unsupported(url: &str) -> Self {
        Self::RangesUnsupported {
            url: url.to_string(),
        }
    }

    pub(crate) fn malformed(url: &str, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}
