//! Persistent configuration.
//!
//! Settings live in an INI file under the platform config directory
//! (`~/.config/mirrorfetch/config.ini` on Linux). A missing file yields the
//! defaults, and every key is optional.
//!
//! ```ini
//! [download]
//! chunk_size = 15728640
//! workers = 4
//! retries = 3
//! retry_backoff_ms = 1000
//! timeout_secs = 300
//! max_buffered_chunks = 8
//!
//! [install]
//! keep_archive = false
//! marker_name = .finished
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::download::{
    DownloadSettings, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF,
    DEFAULT_TIMEOUT_SECS, DEFAULT_WORKERS,
};
use crate::install::DEFAULT_MARKER_NAME;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("failed to write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadConfig {
    pub chunk_size: u64,
    pub workers: usize,
    pub retries: u32,
    pub retry_backoff: Duration,
    pub timeout_secs: u64,
    /// `None` means twice the worker count.
    pub max_buffered_chunks: Option<usize>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: DEFAULT_WORKERS,
            retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_buffered_chunks: None,
        }
    }
}

/// `[install]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallConfig {
    pub keep_archive: bool,
    pub marker_name: String,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            keep_archive: false,
            marker_name: DEFAULT_MARKER_NAME.to_string(),
        }
    }
}

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub download: DownloadConfig,
    pub install: InstallConfig,
}

impl ConfigFile {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if !path.exists() {
            return Ok(config);
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|section| section.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value.trim())?;
            }
        }

        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating its directory if needed. Unset keys are omitted.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini.write_to_file(path).map_err(write_err)
    }

    /// Downloader tunables derived from the `[download]` section.
    pub fn download_settings(&self) -> DownloadSettings {
        let d = &self.download;
        let settings = DownloadSettings::default()
            .with_chunk_size(d.chunk_size)
            .with_workers(d.workers)
            .with_max_retries(d.retries)
            .with_retry_backoff(d.retry_backoff)
            .with_request_timeout(Duration::from_secs(d.timeout_secs));
        match d.max_buffered_chunks {
            Some(chunks) => settings.with_max_buffered_chunks(chunks),
            None => settings,
        }
    }
}

/// Path of the configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mirrorfetch")
        .join("config.ini")
}

/// Settable configuration keys, addressed as `section.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    DownloadChunkSize,
    DownloadWorkers,
    DownloadRetries,
    DownloadRetryBackoffMs,
    DownloadTimeoutSecs,
    DownloadMaxBufferedChunks,
    InstallKeepArchive,
    InstallMarkerName,
}

impl ConfigKey {
    /// Every key, in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            Self::DownloadChunkSize,
            Self::DownloadWorkers,
            Self::DownloadRetries,
            Self::DownloadRetryBackoffMs,
            Self::DownloadTimeoutSecs,
            Self::DownloadMaxBufferedChunks,
            Self::InstallKeepArchive,
            Self::InstallMarkerName,
        ]
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    pub fn section(&self) -> &'static str {
        match self {
            Self::InstallKeepArchive | Self::InstallMarkerName => "install",
            _ => "download",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            Self::DownloadChunkSize => "chunk_size",
            Self::DownloadWorkers => "workers",
            Self::DownloadRetries => "retries",
            Self::DownloadRetryBackoffMs => "retry_backoff_ms",
            Self::DownloadTimeoutSecs => "timeout_secs",
            Self::DownloadMaxBufferedChunks => "max_buffered_chunks",
            Self::InstallKeepArchive => "keep_archive",
            Self::InstallMarkerName => "marker_name",
        }
    }

    /// Current value as a string; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        let d = &config.download;
        match self {
            Self::DownloadChunkSize => d.chunk_size.to_string(),
            Self::DownloadWorkers => d.workers.to_string(),
            Self::DownloadRetries => d.retries.to_string(),
            Self::DownloadRetryBackoffMs => d.retry_backoff.as_millis().to_string(),
            Self::DownloadTimeoutSecs => d.timeout_secs.to_string(),
            Self::DownloadMaxBufferedChunks => d
                .max_buffered_chunks
                .map(|n| n.to_string())
                .unwrap_or_default(),
            Self::InstallKeepArchive => config.install.keep_archive.to_string(),
            Self::InstallMarkerName => config.install.marker_name.clone(),
        }
    }

    /// Parse and store `value`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let d = &mut config.download;
        match self {
            Self::DownloadChunkSize => d.chunk_size = self.parse_positive(value)?,
            Self::DownloadWorkers => d.workers = self.parse_positive(value)?,
            Self::DownloadRetries => d.retries = self.parse_number(value)?,
            Self::DownloadRetryBackoffMs => {
                d.retry_backoff = Duration::from_millis(self.parse_number(value)?)
            }
            Self::DownloadTimeoutSecs => d.timeout_secs = self.parse_positive(value)?,
            Self::DownloadMaxBufferedChunks => {
                d.max_buffered_chunks = if value.is_empty() {
                    None
                } else {
                    Some(self.parse_positive(value)?)
                }
            }
            Self::InstallKeepArchive => config.install.keep_archive = self.parse_bool(value)?,
            Self::InstallMarkerName => {
                if value.is_empty() || value.contains(['/', '\\']) {
                    return Err(self.invalid(value, "must be a plain file name"));
                }
                config.install.marker_name = value.to_string();
            }
        }
        Ok(())
    }

    fn parse_number<N: FromStr>(&self, value: &str) -> Result<N, ConfigError>
    where
        N::Err: fmt::Display,
    {
        value
            .parse()
            .map_err(|e: N::Err| self.invalid(value, &e.to_string()))
    }

    fn parse_positive<N: FromStr + Default + PartialEq>(&self, value: &str) -> Result<N, ConfigError>
    where
        N::Err: fmt::Display,
    {
        let n: N = self.parse_number(value)?;
        if n == N::default() {
            return Err(self.invalid(value, "must be at least 1"));
        }
        Ok(n)
    }

    fn parse_bool(&self, value: &str) -> Result<bool, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(self.invalid(value, "expected true or false")),
        }
    }

    fn invalid(&self, value: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|key| key.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Format a byte count for display (e.g. `15.0 MB`).
pub fn format_size(bytes: usize) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.download.chunk_size, 15 * 1024 * 1024);
        assert_eq!(config.install.marker_name, ".finished");
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.download.workers = 8;
        config.download.retry_backoff = Duration::from_millis(250);
        config.download.max_buffered_chunks = Some(12);
        config.install.keep_archive = true;
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        fs::write(&path, "[download]\nworkers = 2\n").unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.download.workers, 2);
        assert_eq!(config.download.retries, DEFAULT_MAX_RETRIES);
        assert!(!config.install.keep_archive);
    }

    #[test]
    fn test_malformed_number_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        fs::write(&path, "[download]\nchunk_size = lots\n").unwrap();

        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "download.chunk_size"));
    }

    #[test]
    fn test_key_parse_and_display() {
        let key: ConfigKey = "download.workers".parse().unwrap();
        assert_eq!(key, ConfigKey::DownloadWorkers);
        assert_eq!(key.to_string(), "download.workers");
        assert!("download.nope".parse::<ConfigKey>().is_err());
    }

    #[test]
    fn test_set_validates() {
        let mut config = ConfigFile::default();

        assert!(ConfigKey::DownloadWorkers.set(&mut config, "0").is_err());
        assert!(ConfigKey::InstallMarkerName.set(&mut config, "a/b").is_err());
        assert!(ConfigKey::InstallKeepArchive.set(&mut config, "maybe").is_err());

        ConfigKey::DownloadRetries.set(&mut config, "0").unwrap();
        ConfigKey::InstallKeepArchive.set(&mut config, "yes").unwrap();
        assert_eq!(config.download.retries, 0);
        assert!(config.install.keep_archive);
    }

    #[test]
    fn test_unset_buffered_chunks_reads_empty() {
        let config = ConfigFile::default();
        assert_eq!(ConfigKey::DownloadMaxBufferedChunks.get(&config), "");
    }

    #[test]
    fn test_download_settings_from_config() {
        let mut config = ConfigFile::default();
        config.download.workers = 6;
        config.download.timeout_secs = 30;

        let settings = config.download_settings();
        assert_eq!(settings.concurrent_workers, 6);
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.max_buffered_chunks, None);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(15 * 1024 * 1024), "15.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
