//! Retry/fallback controller.
//!
//! The controller drives whole attempts. A failed attempt is retried against
//! the same URL until its retry budget is spent, then the next mirror is
//! tried with a fresh budget. When every URL is exhausted the last error is
//! returned as the cause of [`DownloadError::Exhausted`].
//!
//! ```text
//!            ┌──────────── retry (same URL, after backoff) ───────────┐
//!            │            ┌── fallback (next URL, budget reset) ──────┤
//!            ▼            ▼                                           │
//!        Probing ──► Fetching ──► Flushing ──► Succeeded ──► publish  │
//!            │            │            │                              │
//!            └────────────┴────────────┴──────► Failed ───────────────┘
//!                                                  │
//!                                                  └──► Exhausted
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::attempt::Attempt;
use super::error::{DownloadError, DownloadResult};
use super::finalize::{discard, ensure_parent_dir, publish};
use super::http::{HttpTransport, ReqwestTransport};
use super::progress::ProgressCallback;
use super::request::{DownloadRequest, DownloadSettings};

/// What the controller does after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Try the same URL again.
    Retry { url_index: usize, attempt: u32 },
    /// Move on to the next URL with a fresh retry budget.
    Fallback { url_index: usize },
    /// No URLs or retries remain.
    Exhausted,
}

/// Retry and fallback bookkeeping.
///
/// Each URL gets one initial attempt plus `max_retries` retries.
#[derive(Debug, Clone)]
pub struct RetryPlan {
    url_count: usize,
    max_retries: u32,
    url_index: usize,
    attempt: u32,
    retries_left: u32,
    total_attempts: u32,
}

impl RetryPlan {
    /// Create a plan over `url_count` URLs.
    pub fn new(url_count: usize, max_retries: u32) -> Self {
        Self {
            url_count,
            max_retries,
            url_index: 0,
            attempt: 1,
            retries_left: max_retries,
            total_attempts: 1,
        }
    }

    /// Index of the URL for the current attempt.
    pub fn url_index(&self) -> usize {
        self.url_index
    }

    /// Attempt number against the current URL, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Attempts made so far across all URLs, including the current one.
    pub fn total_attempts(&self) -> u32 {
        self.total_attempts
    }

    /// Record a failed attempt and decide what comes next.
    pub fn on_failure(&mut self) -> Transition {
        if self.retries_left > 0 {
            self.retries_left -= 1;
            self.attempt += 1;
            self.total_attempts += 1;
            Transition::Retry {
                url_index: self.url_index,
                attempt: self.attempt,
            }
        } else if self.url_index + 1 < self.url_count {
            self.url_index += 1;
            self.attempt = 1;
            self.retries_left = self.max_retries;
            self.total_attempts += 1;
            Transition::Fallback {
                url_index: self.url_index,
            }
        } else {
            Transition::Exhausted
        }
    }
}

/// Summary of a successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Published file.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes: u64,
    /// URL that served the successful attempt.
    pub url: String,
    /// Index of that URL (0 is the primary).
    pub url_index: usize,
    /// Attempts made across all URLs.
    pub attempts: u32,
}

/// Concurrent, chunked, retrying downloader.
///
/// Generic over the transport so tests can script network behaviour.
#[derive(Debug)]
pub struct ChunkedDownloader<T = ReqwestTransport> {
    transport: Arc<T>,
}

impl<T> Clone for ChunkedDownloader<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl ChunkedDownloader<ReqwestTransport> {
    /// Create a downloader using `reqwest` with the default timeout.
    pub fn new() -> DownloadResult<Self> {
        Ok(Self::with_transport(ReqwestTransport::new()?))
    }

    /// Create a downloader whose HTTP client honours `settings`.
    pub fn from_settings(settings: &DownloadSettings) -> DownloadResult<Self> {
        Ok(Self::with_transport(ReqwestTransport::with_timeout(
            settings.request_timeout,
        )?))
    }
}

impl<T: HttpTransport> ChunkedDownloader<T> {
    /// Create a downloader over a custom transport.
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Download `request`, reporting progress to `on_progress`.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        on_progress: Option<&ProgressCallback>,
    ) -> DownloadResult<DownloadOutcome> {
        self.download_cancellable(request, on_progress, CancellationToken::new())
            .await
    }

    /// Download `request`, aborting when `cancel` fires.
    ///
    /// On cancellation the working file is left in place and the destination
    /// is never created.
    #[instrument(skip_all, fields(dest = %request.destination().display()))]
    pub async fn download_cancellable(
        &self,
        request: &DownloadRequest,
        on_progress: Option<&ProgressCallback>,
        cancel: CancellationToken,
    ) -> DownloadResult<DownloadOutcome> {
        let temp_path = request.temp_path();
        ensure_parent_dir(request.destination()).await?;

        let mut plan = RetryPlan::new(request.urls().len(), request.max_retries_per_url());

        loop {
            if cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }

            let url_index = plan.url_index();
            let url = &request.urls()[url_index];
            info!(url = %url, url_index, attempt = plan.attempt(), "Starting download attempt");

            let attempt = Attempt {
                transport: &self.transport,
                request,
                url,
                url_index,
                attempt: plan.attempt(),
                progress: on_progress,
                cancel: &cancel,
            };

            let failure = match attempt.run().await {
                Ok(bytes) => {
                    publish(&temp_path, request.destination()).await?;
                    info!(
                        url = %url,
                        bytes,
                        attempts = plan.total_attempts(),
                        "Download complete"
                    );
                    return Ok(DownloadOutcome {
                        path: request.destination().to_path_buf(),
                        bytes,
                        url: url.clone(),
                        url_index,
                        attempts: plan.total_attempts(),
                    });
                }
                Err(failure) => failure,
            };

            if failure.error.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            if !failure.error.is_retryable() {
                discard(&temp_path).await;
                return Err(failure.error);
            }

            warn!(
                url = %url,
                attempt = plan.attempt(),
                phase = %failure.phase,
                error = %failure.error,
                "Download attempt failed"
            );

            match plan.on_failure() {
                Transition::Retry { attempt, .. } => {
                    info!(url = %url, attempt, backoff_ms = request.retry_backoff().as_millis() as u64, "Retrying");
                    backoff(request.retry_backoff(), &cancel).await?;
                }
                Transition::Fallback { url_index } => {
                    warn!(
                        from = %url,
                        to = %request.urls()[url_index],
                        "Retries exhausted, falling back to mirror"
                    );
                }
                Transition::Exhausted => {
                    discard(&temp_path).await;
                    return Err(DownloadError::Exhausted {
                        attempts: plan.total_attempts(),
                        urls: request.urls().len(),
                        last: Box::new(failure.error),
                    });
                }
            }
        }
    }
}

/// Sleep for `delay` unless cancelled first.
async fn backoff(delay: Duration, cancel: &CancellationToken) -> DownloadResult<()> {
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DownloadError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
