//! One full download attempt against a single URL.
//!
//! An attempt probes the length, fetches and sequences every byte into a
//! freshly truncated working file, then flushes it. Nothing survives from
//! one attempt to the next: pending chunks, offsets and file contents are
//! all rebuilt.
//!
//! A server that advertises ranges but answers them with the full body
//! turns the attempt into a single streamed `GET` rather than a failure.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::allocator::OffsetAllocator;
use super::error::{DownloadError, DownloadResult};
use super::finalize::{close_temp_file, open_temp_file};
use super::http::HttpTransport;
use super::progress::{ProgressCallback, ProgressReporter};
use super::request::DownloadRequest;
use super::sequencer::Sequencer;
use super::worker::{spawn_workers, WorkerContext};

/// Buffer size for the working file writer (1 MiB).
const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// Phase an attempt was in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    /// Determining the content length.
    Probing,
    /// Fetching and sequencing bytes.
    Fetching,
    /// Flushing the working file to disk.
    Flushing,
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Probing => "probing",
            Self::Fetching => "fetching",
            Self::Flushing => "flushing",
        };
        f.write_str(name)
    }
}

/// Why an attempt failed.
#[derive(Debug)]
pub(crate) struct AttemptFailure {
    pub phase: AttemptPhase,
    pub error: DownloadError,
}

impl AttemptFailure {
    fn at(phase: AttemptPhase) -> impl FnOnce(DownloadError) -> Self {
        move |error| Self { phase, error }
    }
}

/// A single attempt against one URL.
pub(crate) struct Attempt<'a, T> {
    pub transport: &'a Arc<T>,
    pub request: &'a DownloadRequest,
    pub url: &'a str,
    pub url_index: usize,
    pub attempt: u32,
    pub progress: Option<&'a ProgressCallback>,
    pub cancel: &'a CancellationToken,
}

impl<T: HttpTransport> Attempt<'_, T> {
    /// Run the attempt, returning the number of bytes written.
    pub(crate) async fn run(&self) -> Result<u64, AttemptFailure> {
        let probed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DownloadError::Cancelled),
            probe = self.transport.probe(self.url) => probe,
        };
        let probe = probed.map_err(AttemptFailure::at(AttemptPhase::Probing))?;

        debug!(
            url = self.url,
            content_length = ?probe.content_length,
            accepts_ranges = probe.accepts_ranges,
            "Probed content length"
        );

        let temp_path = self.request.temp_path();
        let file = open_temp_file(&temp_path)
            .await
            .map_err(AttemptFailure::at(AttemptPhase::Fetching))?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);

        let mut reporter =
            ProgressReporter::new(self.progress, probe.content_length, self.url_index, self.attempt);
        reporter.start();

        let fetched = match probe.chunked_length() {
            Some(length) => {
                let chunked = self
                    .fetch_chunked(length, &mut writer, &temp_path, &mut reporter)
                    .await;
                match chunked {
                    Err(DownloadError::RangesUnsupported { .. }) => {
                        info!(url = self.url, "Server ignored Range, restarting as a stream");
                        let file = open_temp_file(&temp_path)
                            .await
                            .map_err(AttemptFailure::at(AttemptPhase::Fetching))?;
                        writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
                        self.fetch_streaming(
                            probe.content_length,
                            &mut writer,
                            &temp_path,
                            &mut reporter,
                        )
                        .await
                    }
                    other => other,
                }
            }
            None => {
                info!(url = self.url, "Length unknown or ranges unsupported, streaming");
                self.fetch_streaming(probe.content_length, &mut writer, &temp_path, &mut reporter)
                    .await
            }
        };
        let written = fetched.map_err(AttemptFailure::at(AttemptPhase::Fetching))?;

        writer
            .flush()
            .await
            .map_err(|e| DownloadError::write_failed(&temp_path, e))
            .map_err(AttemptFailure::at(AttemptPhase::Flushing))?;
        close_temp_file(writer.into_inner(), &temp_path)
            .await
            .map_err(AttemptFailure::at(AttemptPhase::Flushing))?;

        Ok(written)
    }

    /// Fetch `length` bytes with the worker pool and sequence them.
    async fn fetch_chunked<W: AsyncWrite + Unpin>(
        &self,
        length: u64,
        writer: &mut W,
        temp_path: &Path,
        reporter: &mut ProgressReporter<'_>,
    ) -> DownloadResult<u64> {
        let window = self.request.window();
        let allocator = Arc::new(OffsetAllocator::new(
            length,
            self.request.chunk_size(),
            window,
        ));
        let workers = self.request.concurrent_workers();
        debug!(
            url = self.url,
            chunks = allocator.chunk_count(),
            workers,
            window,
            "Starting chunked fetch"
        );

        let (events_tx, mut events_rx) = mpsc::channel(window);
        let attempt_cancel = self.cancel.child_token();
        let mut tasks = JoinSet::new();
        spawn_workers(
            &mut tasks,
            workers,
            WorkerContext {
                transport: Arc::clone(self.transport),
                url: Arc::from(self.url),
                allocator: Arc::clone(&allocator),
                events: events_tx,
                cancel: attempt_cancel.clone(),
            },
        );

        let mut sequencer = Sequencer::new(writer, temp_path, self.url, length);
        let result = sequencer.run(&mut events_rx, reporter, self.cancel).await;

        // Stop the remaining workers; their chunks are discarded with the receiver.
        attempt_cancel.cancel();
        allocator.close();
        drop(events_rx);
        tasks.shutdown().await;

        result
    }

    /// Fetch the whole body with one unranged request.
    async fn fetch_streaming<W: AsyncWrite + Unpin>(
        &self,
        expected: Option<u64>,
        writer: &mut W,
        temp_path: &Path,
        reporter: &mut ProgressReporter<'_>,
    ) -> DownloadResult<u64> {
        let mut body = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(DownloadError::Cancelled),
            body = self.transport.fetch_stream(self.url) => body?,
        };

        let mut written = 0u64;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(DownloadError::Cancelled),
                next = body.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    if bytes.is_empty() {
                        continue;
                    }
                    writer
                        .write_all(&bytes)
                        .await
                        .map_err(|e| DownloadError::write_failed(temp_path, e))?;
                    written += bytes.len() as u64;
                    reporter.record(written);
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        match expected {
            Some(expected) if expected != written => Err(DownloadError::malformed(
                self.url,
                format!("expected {} bytes, received {}", expected, written),
            )),
            _ => Ok(written),
        }
    }
}
