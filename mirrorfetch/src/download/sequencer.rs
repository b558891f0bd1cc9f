//! Ordered reassembly of chunks.
//!
//! Workers finish in any order. The sequencer is the single consumer of
//! their events and the only writer of the working file: a chunk is written
//! only when it starts exactly at the write frontier, so output is contiguous
//! and ascending regardless of arrival order.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::allocator::Chunk;
use super::error::{DownloadError, DownloadResult};
use super::progress::ProgressReporter;

/// Events produced by chunk workers.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Chunk(Chunk),
    Failed(DownloadError),
}

/// Buffers out-of-order chunks and flushes them in offset order.
pub(crate) struct Sequencer<W> {
    writer: W,
    path: PathBuf,
    url: String,
    content_length: u64,
    pending: BTreeMap<u64, Chunk>,
    next_write_offset: u64,
    bytes_written: u64,
}

impl<W: AsyncWrite + Unpin> Sequencer<W> {
    pub(crate) fn new(
        writer: W,
        path: impl Into<PathBuf>,
        url: &str,
        content_length: u64,
    ) -> Self {
        Self {
            writer,
            path: path.into(),
            url: url.to_string(),
            content_length,
            pending: BTreeMap::new(),
            next_write_offset: 0,
            bytes_written: 0,
        }
    }

    pub(crate) fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Consume worker events until every byte has been written.
    ///
    /// The first worker failure ends the attempt; chunks still buffered are
    /// discarded with the sequencer.
    pub(crate) async fn run(
        &mut self,
        events: &mut mpsc::Receiver<WorkerEvent>,
        progress: &mut ProgressReporter<'_>,
        cancel: &CancellationToken,
    ) -> DownloadResult<u64> {
        while self.bytes_written < self.content_length {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                event = events.recv() => event,
            };

            match event {
                Some(WorkerEvent::Chunk(chunk)) => self.accept(chunk, progress).await?,
                Some(WorkerEvent::Failed(e)) => return Err(e),
                None => {
                    return Err(DownloadError::malformed(
                        &self.url,
                        format!(
                            "transfer stopped at byte {} of {}",
                            self.bytes_written, self.content_length
                        ),
                    ))
                }
            }
        }

        Ok(self.bytes_written)
    }

    /// Buffer a chunk and flush everything now contiguous with the frontier.
    pub(crate) async fn accept(
        &mut self,
        chunk: Chunk,
        progress: &mut ProgressReporter<'_>,
    ) -> DownloadResult<()> {
        if chunk.is_empty()
            || chunk.offset < self.next_write_offset
            || self.pending.contains_key(&chunk.offset)
        {
            return Err(DownloadError::malformed(
                &self.url,
                format!(
                    "unexpected chunk at offset {} ({} bytes)",
                    chunk.offset,
                    chunk.len()
                ),
            ));
        }
        if chunk.offset.saturating_add(chunk.len()) > self.content_length {
            return Err(DownloadError::malformed(
                &self.url,
                format!(
                    "chunk at offset {} overruns content length {}",
                    chunk.offset, self.content_length
                ),
            ));
        }

        self.pending.insert(chunk.offset, chunk);

        while let Some(chunk) = self.pending.remove(&self.next_write_offset) {
            self.writer
                .write_all(&chunk.data)
                .await
                .map_err(|e| DownloadError::write_failed(&self.path, e))?;

            self.next_write_offset += chunk.len();
            self.bytes_written += chunk.len();
            trace!(
                offset = chunk.offset,
                bytes = chunk.len(),
                buffered = self.pending.len(),
                "Flushed chunk"
            );
            progress.record(self.bytes_written);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::progress::{DownloadProgress, ProgressCallback};
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn split(data: &[u8], chunk: usize) -> Vec<Chunk> {
        data.chunks(chunk)
            .enumerate()
            .map(|(i, c)| Chunk::new((i * chunk) as u64, c.to_vec()))
            .collect()
    }

    #[tokio::test]
    async fn test_writes_in_order_despite_reverse_arrival() {
        let data = content(100);
        let mut out = Vec::new();
        let mut reporter = ProgressReporter::new(None, Some(100), 0, 1);

        {
            let mut sequencer = Sequencer::new(&mut out, "/tmp/x", "http://a", 100);
            for chunk in split(&data, 30).into_iter().rev() {
                sequencer.accept(chunk, &mut reporter).await.unwrap();
            }
            assert_eq!(sequencer.bytes_written(), 100);
            assert_eq!(sequencer.pending_len(), 0);
        }

        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_holds_chunks_until_gap_filled() {
        let data = content(90);
        let chunks = split(&data, 30);
        let mut out = Vec::new();
        let mut reporter = ProgressReporter::new(None, Some(90), 0, 1);
        let mut sequencer = Sequencer::new(&mut out, "/tmp/x", "http://a", 90);

        let mut chunks = chunks.into_iter();
        let first = chunks.next().unwrap();
        let second = chunks.next().unwrap();
        let third = chunks.next().unwrap();

        sequencer.accept(third, &mut reporter).await.unwrap();
        sequencer.accept(second, &mut reporter).await.unwrap();
        assert_eq!(sequencer.bytes_written(), 0);
        assert_eq!(sequencer.pending_len(), 2);

        sequencer.accept(first, &mut reporter).await.unwrap();
        assert_eq!(sequencer.bytes_written(), 90);
        assert_eq!(sequencer.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_rejects_duplicate_and_overrun_chunks() {
        let mut out = Vec::new();
        let mut reporter = ProgressReporter::new(None, Some(20), 0, 1);
        let mut sequencer = Sequencer::new(&mut out, "/tmp/x", "http://a", 20);

        sequencer
            .accept(Chunk::new(10, vec![1u8; 10]), &mut reporter)
            .await
            .unwrap();
        let dup = sequencer
            .accept(Chunk::new(10, vec![1u8; 10]), &mut reporter)
            .await;
        assert!(matches!(dup, Err(DownloadError::MalformedResponse { .. })));

        let overrun = sequencer
            .accept(Chunk::new(0, vec![1u8; 25]), &mut reporter)
            .await;
        assert!(matches!(overrun, Err(DownloadError::MalformedResponse { .. })));
    }

    #[tokio::test]
    async fn test_run_stops_on_first_failure() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(WorkerEvent::Chunk(Chunk::new(10, vec![0u8; 10])))
            .await
            .unwrap();
        tx.send(WorkerEvent::Failed(DownloadError::Http {
            url: "http://a".to_string(),
            reason: "connection reset".to_string(),
        }))
        .await
        .unwrap();

        let mut out = Vec::new();
        let mut reporter = ProgressReporter::new(None, Some(20), 0, 1);
        let mut sequencer = Sequencer::new(&mut out, "/tmp/x", "http://a", 20);
        let result = sequencer
            .run(&mut rx, &mut reporter, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(DownloadError::Http { .. })));
        assert_eq!(sequencer.bytes_written(), 0);
    }

    #[tokio::test]
    async fn test_run_detects_short_transfer() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(WorkerEvent::Chunk(Chunk::new(0, vec![0u8; 10])))
            .await
            .unwrap();
        drop(tx);

        let mut out = Vec::new();
        let mut reporter = ProgressReporter::new(None, Some(20), 0, 1);
        let mut sequencer = Sequencer::new(&mut out, "/tmp/x", "http://a", 20);
        let result = sequencer
            .run(&mut rx, &mut reporter, &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(DownloadError::MalformedResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_observes_cancellation() {
        let (_tx, mut rx) = mpsc::channel::<WorkerEvent>(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut out = Vec::new();
        let mut reporter = ProgressReporter::new(None, Some(20), 0, 1);
        let mut sequencer = Sequencer::new(&mut out, "/tmp/x", "http://a", 20);
        let result = sequencer.run(&mut rx, &mut reporter, &cancel).await;

        assert!(matches!(result, Err(DownloadError::Cancelled)));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_complete() {
        let events = Arc::new(Mutex::new(Vec::<DownloadProgress>::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Box::new(move |p| sink.lock().unwrap().push(*p));

        let data = content(70);
        let mut out = Vec::new();
        let mut reporter = ProgressReporter::new(Some(&callback), Some(70), 0, 1);
        let mut sequencer = Sequencer::new(&mut out, "/tmp/x", "http://a", 70);

        let order = [2usize, 0, 3, 1];
        let chunks = split(&data, 20);
        let mut slots: Vec<Option<Chunk>> = chunks.into_iter().map(Some).collect();
        for i in order {
            let chunk = slots[i].take().unwrap();
            sequencer.accept(chunk, &mut reporter).await.unwrap();
        }

        let events = events.lock().unwrap();
        let written: Vec<u64> = events.iter().map(|e| e.bytes_written).collect();
        assert!(written.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(written.last(), Some(&70));
    }

    proptest! {
        #[test]
        fn prop_any_arrival_order_reassembles(
            len in 1usize..4_000,
            chunk in 1usize..700,
            seed in any::<u64>(),
        ) {
            let data = content(len);
            let mut chunks = split(&data, chunk);

            // Deterministic shuffle driven by the seed.
            let mut state = seed | 1;
            for i in (1..chunks.len()).rev() {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                chunks.swap(i, (state % (i as u64 + 1)) as usize);
            }

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let out = runtime.block_on(async {
                let mut out = Vec::new();
                let mut reporter = ProgressReporter::new(None, Some(len as u64), 0, 1);
                let mut sequencer = Sequencer::new(&mut out, "/tmp/x", "http://a", len as u64);
                for c in chunks {
                    sequencer.accept(c, &mut reporter).await.unwrap();
                }
                out
            });

            prop_assert_eq!(out, data);
        }
    }
}
