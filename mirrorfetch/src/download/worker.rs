//! Chunk worker pool.
//!
//! Each worker loops: claim a range from the allocator, fetch it with a
//! ranged `GET`, hand the chunk to the sequencer. A failure is reported once
//! and ends the worker; the sequencer treats it as fatal for the attempt.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::allocator::OffsetAllocator;
use super::http::HttpTransport;
use super::sequencer::WorkerEvent;

/// Shared inputs for the workers of one attempt.
pub(crate) struct WorkerContext<T> {
    pub transport: Arc<T>,
    pub url: Arc<str>,
    pub allocator: Arc<OffsetAllocator>,
    pub events: mpsc::Sender<WorkerEvent>,
    pub cancel: CancellationToken,
}

impl<T> Clone for WorkerContext<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            url: Arc::clone(&self.url),
            allocator: Arc::clone(&self.allocator),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

/// Spawn `count` workers onto `tasks`.
///
/// Each worker holds at most one request in flight, so `count` bounds the
/// number of concurrent ranged requests.
pub(crate) fn spawn_workers<T: HttpTransport>(
    tasks: &mut JoinSet<()>,
    count: usize,
    ctx: WorkerContext<T>,
) {
    for id in 0..count {
        tasks.spawn(run_worker(id, ctx.clone()));
    }
}

#[instrument(skip(ctx), fields(url = %ctx.url))]
async fn run_worker<T: HttpTransport>(id: usize, ctx: WorkerContext<T>) {
    loop {
        let claim = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return,
            claim = ctx.allocator.claim() => claim,
        };
        let Some(claim) = claim else {
            debug!(worker = id, "No ranges left");
            return;
        };

        let range = claim.range;
        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return,
            result = ctx.transport.fetch_range(&ctx.url, range) => result,
        };

        let event = match result {
            Ok(data) => {
                debug!(worker = id, offset = range.start, bytes = data.len(), "Fetched chunk");
                WorkerEvent::Chunk(claim.into_chunk(data))
            }
            Err(e) => {
                debug!(worker = id, offset = range.start, error = %e, "Chunk fetch failed");
                WorkerEvent::Failed(e)
            }
        };

        let failed = matches!(event, WorkerEvent::Failed(_));
        if ctx.events.send(event).await.is_err() || failed {
            return;
        }
    }
}
