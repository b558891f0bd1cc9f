//! CLI error type.

use std::fmt;

use mirrorfetch::config::ConfigError;
use mirrorfetch::download::DownloadError;
use mirrorfetch::install::InstallError;

/// Errors surfaced to the user by the CLI.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be read, parsed or saved.
    Config(String),
    /// A command-line argument was rejected.
    InvalidArgument(String),
    /// The download failed.
    Download(DownloadError),
    /// A post-download step failed.
    Install(InstallError),
    /// The async runtime or signal handler could not be set up.
    Runtime(String),
    /// Interrupted by the user.
    Cancelled,
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => 2,
            Self::Cancelled => 130,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Self::Download(DownloadError::Exhausted { attempts, urls, last }) => write!(
                f,
                "Download failed after {} attempts across {} URL(s). Last error: {}",
                attempts, urls, last
            ),
            Self::Download(e) => write!(f, "Download failed: {}", e),
            Self::Install(e) => write!(f, "Install failed: {}", e),
            Self::Runtime(msg) => write!(f, "Runtime error: {}", msg),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<DownloadError> for CliError {
    fn from(e: DownloadError) -> Self {
        match e {
            DownloadError::Cancelled => Self::Cancelled,
            DownloadError::InvalidRequest(msg) => Self::InvalidArgument(msg),
            other => Self::Download(other),
        }
    }
}

impl From<InstallError> for CliError {
    fn from(e: InstallError) -> Self {
        match e {
            InstallError::Download(e) => e.into(),
            other => Self::Install(other),
        }
    }
}
