//! HTTP transport used by the downloader.
//!
//! The [`HttpTransport`] trait is the seam between the download engine and
//! the network. [`ReqwestTransport`] is the production implementation; tests
//! substitute scripted transports to inject failures and reorder chunks.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};

use super::error::{DownloadError, DownloadResult};
use super::request::DEFAULT_TIMEOUT_SECS;

/// Streamed response body for unranged downloads.
pub type BodyStream = Pin<Box<dyn Stream<Item = DownloadResult<Bytes>> + Send>>;

/// Inclusive byte range of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Create a range covering `start..=end`.
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "empty byte range {}-{}", start, end);
        Self { start, end }
    }

    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A byte range always covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Value of the `Range` request header.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Outcome of a length probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// Total length, or `None` when the server did not report one.
    pub content_length: Option<u64>,
    /// `false` only when the server explicitly advertises `Accept-Ranges: none`.
    pub accepts_ranges: bool,
}

impl ProbeResult {
    /// Probe result for a resource of known length that accepts ranges.
    pub fn ranged(content_length: u64) -> Self {
        Self {
            content_length: Some(content_length),
            accepts_ranges: true,
        }
    }

    /// Probe result for a resource of unknown length.
    pub fn unknown_length() -> Self {
        Self {
            content_length: None,
            accepts_ranges: true,
        }
    }

    /// Length to fetch in parallel chunks, if chunking is possible.
    pub fn chunked_length(&self) -> Option<u64> {
        self.content_length.filter(|_| self.accepts_ranges)
    }
}

/// Network operations required by the downloader.
pub trait HttpTransport: Send + Sync + 'static {
    /// Issue a `HEAD` request and report the content length.
    ///
    /// Transport errors and non-2xx statuses fail the attempt.
    fn probe(&self, url: &str) -> impl Future<Output = DownloadResult<ProbeResult>> + Send;

    /// Fetch exactly the bytes of `range` with a ranged `GET`.
    ///
    /// A server that ignores the `Range` header is reported as
    /// [`DownloadError::RangesUnsupported`] so the attempt can stream instead.
    fn fetch_range(
        &self,
        url: &str,
        range: ByteRange,
    ) -> impl Future<Output = DownloadResult<Bytes>> + Send;

    /// Issue an unranged `GET` and stream the body.
    fn fetch_stream(&self, url: &str) -> impl Future<Output = DownloadResult<BodyStream>> + Send;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport with the default timeout.
    pub fn new() -> DownloadResult<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a transport with a custom connect and idle-read timeout.
    ///
    /// No limit is placed on the total duration of a request: a large body
    /// that keeps arriving is never cut off, while a stalled connection fails
    /// once no bytes arrive for `timeout`.
    pub fn with_timeout(timeout: Duration) -> DownloadResult<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| DownloadError::ClientSetup(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// Wrap an existing client, e.g. one configured with a proxy.
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// The configured connect and idle-read timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> DownloadError {
        map_reqwest_error(url, self.timeout, e)
    }
}

fn map_reqwest_error(url: &str, timeout: Duration, e: reqwest::Error) -> DownloadError {
    if e.is_timeout() {
        DownloadError::Timeout {
            url: url.to_string(),
            timeout_secs: timeout.as_secs(),
        }
    } else {
        DownloadError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

impl HttpTransport for ReqwestTransport {
    async fn probe(&self, url: &str) -> DownloadResult<ProbeResult> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::UnexpectedStatus {
                url: url.to_string(),
                method: "HEAD",
                status: status.as_u16(),
            });
        }

        // Read the header directly: the body size hint of a HEAD response is zero.
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());

        let accepts_ranges = response
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .map(|v| !v.trim().eq_ignore_ascii_case("none"))
            .unwrap_or(true);

        Ok(ProbeResult {
            content_length,
            accepts_ranges,
        })
    }

    async fn fetch_range(&self, url: &str, range: ByteRange) -> DownloadResult<Bytes> {
        let response = self
            .client
            .get(url)
            .header(RANGE, range.header_value())
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        if status == StatusCode::OK {
            // Range ignored. Only a single chunk covering the whole resource
            // can use the full body.
            if range.start != 0 {
                return Err(DownloadError::ranges_unsupported(url));
            }
            let body = response
                .bytes()
                .await
                .map_err(|e| self.request_error(url, e))?;
            if body.len() as u64 != range.len() {
                return Err(DownloadError::ranges_unsupported(url));
            }
            return Ok(body);
        }

        if status != StatusCode::PARTIAL_CONTENT {
            return Err(DownloadError::UnexpectedStatus {
                url: url.to_string(),
                method: "GET",
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.request_error(url, e))?;

        if body.len() as u64 != range.len() {
            return Err(DownloadError::malformed(
                url,
                format!(
                    "expected {} bytes for range {}, got {}",
                    range.len(),
                    range.header_value(),
                    body.len()
                ),
            ));
        }

        Ok(body)
    }

    async fn fetch_stream(&self, url: &str) -> DownloadResult<BodyStream> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::UnexpectedStatus {
                url: url.to_string(),
                method: "GET",
                status: status.as_u16(),
            });
        }

        let url = url.to_string();
        let timeout = self.timeout;
        let stream = response
            .bytes_stream()
            .map(move |item| item.map_err(|e| map_reqwest_error(&url, timeout, e)));

        Ok(Box::pin(stream))
    }
}
