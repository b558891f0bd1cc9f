//! Download requests and the settings they are built from.
//!
//! A [`DownloadRequest`] is immutable for the lifetime of one logical
//! download. Tunables that used to be process-wide defaults live in
//! [`DownloadSettings`], so callers (and tests) can vary them per request.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{DownloadError, DownloadResult};

/// Default chunk size (15 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 15 * 1024 * 1024;

/// Default number of concurrent chunk workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Default number of retries per URL after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default pause between attempts against the same URL.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Default connect and idle-read timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// Suffix of the working file written during a download.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Tunable download settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSettings {
    /// Size of every chunk except the shorter tail chunk.
    pub chunk_size: u64,

    /// Number of concurrent chunk workers per attempt.
    pub concurrent_workers: usize,

    /// Retries per URL after the first attempt.
    pub max_retries_per_url: u32,

    /// Fixed pause before retrying the same URL.
    pub retry_backoff: Duration,

    /// HTTP connect and idle-read timeout.
    pub request_timeout: Duration,

    /// Maximum number of chunks claimed but not yet written.
    ///
    /// `None` uses twice the worker count.
    pub max_buffered_chunks: Option<usize>,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrent_workers: DEFAULT_WORKERS,
            max_retries_per_url: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_buffered_chunks: None,
        }
    }
}

impl DownloadSettings {
    /// Set the chunk size in bytes.
    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Set the number of concurrent workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.concurrent_workers = workers;
        self
    }

    /// Set the retry budget per URL.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries_per_url = retries;
        self
    }

    /// Set the pause between retries.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the HTTP connect and idle-read timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the sliding window of buffered chunks.
    pub fn with_max_buffered_chunks(mut self, chunks: usize) -> Self {
        self.max_buffered_chunks = Some(chunks);
        self
    }
}

/// A single logical download: where to fetch from and where to put it.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    urls: Vec<String>,
    destination: PathBuf,
    chunk_size: u64,
    concurrent_workers: usize,
    max_retries_per_url: u32,
    retry_backoff: Duration,
    max_buffered_chunks: Option<usize>,
}

impl DownloadRequest {
    /// Start building a request for `primary_url` saved at `destination`.
    pub fn builder(
        primary_url: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> DownloadRequestBuilder {
        DownloadRequestBuilder::new(primary_url.into(), destination.into())
    }

    /// The primary URL.
    pub fn primary_url(&self) -> &str {
        &self.urls[0]
    }

    /// Mirror URLs tried after the primary, in order.
    pub fn fallback_urls(&self) -> &[String] {
        &self.urls[1..]
    }

    /// Primary followed by fallbacks.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// URL at `index` in try order (0 is the primary).
    pub fn url(&self, index: usize) -> Option<&str> {
        self.urls.get(index).map(String::as_str)
    }

    /// Final path of the downloaded file.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Working file mutated during the download.
    pub fn temp_path(&self) -> PathBuf {
        temp_path_for(&self.destination)
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn concurrent_workers(&self) -> usize {
        self.concurrent_workers
    }

    pub fn max_retries_per_url(&self) -> u32 {
        self.max_retries_per_url
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    /// Maximum number of chunks that may be claimed but not yet written.
    ///
    /// Never smaller than the worker count, otherwise workers would sit idle.
    pub fn window(&self) -> usize {
        self.max_buffered_chunks
            .unwrap_or(self.concurrent_workers * 2)
            .max(self.concurrent_workers)
    }
}

/// Builder for [`DownloadRequest`].
#[derive(Debug, Clone)]
pub struct DownloadRequestBuilder {
    primary_url: String,
    fallback_urls: Vec<String>,
    destination: PathBuf,
    settings: DownloadSettings,
}

impl DownloadRequestBuilder {
    fn new(primary_url: String, destination: PathBuf) -> Self {
        Self {
            primary_url,
            fallback_urls: Vec::new(),
            destination,
            settings: DownloadSettings::default(),
        }
    }

    /// Add a mirror URL; mirrors are tried in the order added.
    pub fn fallback(mut self, url: impl Into<String>) -> Self {
        self.fallback_urls.push(url.into());
        self
    }

    /// Add several mirror URLs.
    pub fn fallbacks<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_urls.extend(urls.into_iter().map(Into::into));
        self
    }

    /// Replace all tunables at once.
    pub fn settings(mut self, settings: &DownloadSettings) -> Self {
        self.settings = settings.clone();
        self
    }

    pub fn chunk_size(mut self, bytes: u64) -> Self {
        self.settings.chunk_size = bytes;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.settings.concurrent_workers = workers;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.settings.max_retries_per_url = retries;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.settings.retry_backoff = backoff;
        self
    }

    pub fn max_buffered_chunks(mut self, chunks: usize) -> Self {
        self.settings.max_buffered_chunks = Some(chunks);
        self
    }

    /// Validate and build the request.
    pub fn build(self) -> DownloadResult<DownloadRequest> {
        if self.primary_url.trim().is_empty() {
            return Err(DownloadError::InvalidRequest(
                "primary URL is empty".to_string(),
            ));
        }
        if let Some(i) = self.fallback_urls.iter().position(|u| u.trim().is_empty()) {
            return Err(DownloadError::InvalidRequest(format!(
                "fallback URL #{} is empty",
                i + 1
            )));
        }
        if self.destination.as_os_str().is_empty() || self.destination.file_name().is_none() {
            return Err(DownloadError::InvalidRequest(format!(
                "destination '{}' does not name a file",
                self.destination.display()
            )));
        }
        if self.settings.chunk_size == 0 {
            return Err(DownloadError::InvalidRequest(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.settings.concurrent_workers == 0 {
            return Err(DownloadError::InvalidRequest(
                "at least one worker is required".to_string(),
            ));
        }

        let mut urls = Vec::with_capacity(1 + self.fallback_urls.len());
        urls.push(self.primary_url);
        urls.extend(self.fallback_urls);

        Ok(DownloadRequest {
            urls,
            destination: self.destination,
            chunk_size: self.settings.chunk_size,
            concurrent_workers: self.settings.concurrent_workers,
            max_retries_per_url: self.settings.max_retries_per_url,
            retry_backoff: self.settings.retry_backoff,
            max_buffered_chunks: self.settings.max_buffered_chunks,
        })
    }
}

/// Path of the working file for `destination` (`<destination>.tmp`).
pub fn temp_path_for(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = DownloadSettings::default();
        assert_eq!(settings.chunk_size, 15 * 1024 * 1024);
        assert_eq!(settings.concurrent_workers, 4);
        assert_eq!(settings.max_retries_per_url, 3);
        assert_eq!(settings.max_buffered_chunks, None);
    }

    #[test]
    fn test_builder_orders_urls() {
        let request = DownloadRequest::builder("http://primary/a.zip", "/tmp/a.zip")
            .fallback("http://m1/a.zip")
            .fallbacks(["http://m2/a.zip", "http://m3/a.zip"])
            .build()
            .unwrap();

        assert_eq!(request.primary_url(), "http://primary/a.zip");
        assert_eq!(request.fallback_urls().len(), 3);
        assert_eq!(request.url(2), Some("http://m2/a.zip"));
        assert_eq!(request.url(4), None);
        assert_eq!(request.urls().len(), 4);
    }

    #[test]
    fn test_builder_applies_settings() {
        let settings = DownloadSettings::default()
            .with_chunk_size(1024)
            .with_workers(2)
            .with_max_retries(0)
            .with_retry_backoff(Duration::from_millis(5));

        let request = DownloadRequest::builder("http://a", "/tmp/a.bin")
            .settings(&settings)
            .build()
            .unwrap();

        assert_eq!(request.chunk_size(), 1024);
        assert_eq!(request.concurrent_workers(), 2);
        assert_eq!(request.max_retries_per_url(), 0);
        assert_eq!(request.retry_backoff(), Duration::from_millis(5));
    }

    #[test]
    fn test_window_never_below_worker_count() {
        let request = DownloadRequest::builder("http://a", "/tmp/a.bin")
            .workers(4)
            .max_buffered_chunks(1)
            .build()
            .unwrap();
        assert_eq!(request.window(), 4);

        let request = DownloadRequest::builder("http://a", "/tmp/a.bin")
            .workers(3)
            .build()
            .unwrap();
        assert_eq!(request.window(), 6);
    }

    #[test]
    fn test_rejects_invalid_requests() {
        assert!(DownloadRequest::builder("  ", "/tmp/a").build().is_err());
        assert!(DownloadRequest::builder("http://a", "").build().is_err());
        assert!(DownloadRequest::builder("http://a", "/tmp/a")
            .chunk_size(0)
            .build()
            .is_err());
        assert!(DownloadRequest::builder("http://a", "/tmp/a")
            .workers(0)
            .build()
            .is_err());
        assert!(DownloadRequest::builder("http://a", "/tmp/a")
            .fallback("")
            .build()
            .is_err());
    }

    #[test]
    fn test_temp_path_appends_suffix() {
        assert_eq!(
            temp_path_for(Path::new("/data/model.tar.gz")),
            PathBuf::from("/data/model.tar.gz.tmp")
        );

        let request = DownloadRequest::builder("http://a", "out/file.zip")
            .build()
            .unwrap();
        assert_eq!(request.temp_path(), PathBuf::from("out/file.zip.tmp"));
    }
}
