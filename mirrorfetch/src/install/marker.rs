//! Completion marker.
//!
//! A small sentinel file recording when an install finished. Its presence
//! lets callers skip work that is already done.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tracing::{debug, warn};

use super::error::{InstallError, InstallResult};

/// Default marker file name.
pub const DEFAULT_MARKER_NAME: &str = ".finished";

const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// Writes and detects the completion marker.
#[derive(Debug, Clone)]
pub struct FinishedMarker {
    name: String,
    attempts: u32,
    delay: Duration,
}

impl Default for FinishedMarker {
    fn default() -> Self {
        Self {
            name: DEFAULT_MARKER_NAME.to_string(),
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl FinishedMarker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Number of write attempts (minimum 1).
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Pause between write attempts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Marker path inside `dir`.
    pub fn path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.name)
    }

    pub fn exists(&self, dir: &Path) -> bool {
        self.path(dir).is_file()
    }

    /// Write the marker with the current local time, retrying on failure.
    pub async fn write(&self, dir: &Path) -> InstallResult<PathBuf> {
        let path = self.path(dir);
        let contents = format!("{}\n", chrono::Local::now().to_rfc3339());

        let mut attempt = 1;
        loop {
            match fs::write(&path, &contents).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Wrote finished marker");
                    return Ok(path);
                }
                Err(e) if attempt < self.attempts => {
                    warn!(
                        path = %path.display(),
                        attempt,
                        error = %e,
                        "Failed to write finished marker, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => {
                    return Err(InstallError::MarkerFailed {
                        path,
                        attempts: attempt,
                        source: e,
                    })
                }
            }
        }
    }

    /// Read back the recorded timestamp.
    pub async fn read(&self, dir: &Path) -> Option<String> {
        let contents = fs::read_to_string(self.path(dir)).await.ok()?;
        Some(contents.trim().to_string())
    }
}
