//! Offset allocation for chunk workers.
//!
//! The allocator hands out non-overlapping byte ranges in ascending order.
//! A claim also takes a slot from a sliding window; the slot travels with
//! the chunk and is released only once the sequencer has written it, which
//! caps how far ahead of the write frontier workers can fetch.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::http::ByteRange;

/// A chunk of the target file, produced by a worker and consumed exactly
/// once by the sequencer.
#[derive(Debug)]
pub struct Chunk {
    /// Byte offset of the first byte of `data`.
    pub offset: u64,
    /// Chunk contents.
    pub data: Bytes,
    // Window slot; dropping it lets another range be claimed.
    _slot: Option<OwnedSemaphorePermit>,
}

impl Chunk {
    /// Create a chunk that holds no window slot.
    pub fn new(offset: u64, data: impl Into<Bytes>) -> Self {
        Self {
            offset,
            data: data.into(),
            _slot: None,
        }
    }

    /// Number of bytes in the chunk.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A claimed range together with its window slot.
#[derive(Debug)]
pub struct ChunkClaim {
    pub range: ByteRange,
    slot: OwnedSemaphorePermit,
}

impl ChunkClaim {
    /// Attach fetched bytes, carrying the window slot over to the chunk.
    pub fn into_chunk(self, data: Bytes) -> Chunk {
        Chunk {
            offset: self.range.start,
            data,
            _slot: Some(self.slot),
        }
    }
}

/// Hands out monotonically increasing, non-overlapping byte ranges.
#[derive(Debug)]
pub struct OffsetAllocator {
    next_offset: Mutex<u64>,
    chunk_size: u64,
    content_length: u64,
    window: Arc<Semaphore>,
}

impl OffsetAllocator {
    /// Create an allocator over `[0, content_length)`.
    ///
    /// `window` is the maximum number of claimed ranges whose chunks have
    /// not yet been written (minimum 1).
    pub fn new(content_length: u64, chunk_size: u64, window: usize) -> Self {
        Self {
            next_offset: Mutex::new(0),
            chunk_size: chunk_size.max(1),
            content_length,
            window: Arc::new(Semaphore::new(window.max(1))),
        }
    }

    /// Number of chunks the content splits into.
    pub fn chunk_count(&self) -> u64 {
        self.content_length.div_ceil(self.chunk_size)
    }

    /// Next offset that has not been handed out yet.
    pub fn next_offset(&self) -> u64 {
        *self.next_offset.lock()
    }

    /// Claim the next range, waiting for a window slot first.
    ///
    /// Returns `None` once the whole content has been handed out or the
    /// allocator has been closed.
    pub async fn claim(&self) -> Option<ChunkClaim> {
        let slot = Arc::clone(&self.window).acquire_owned().await.ok()?;
        let range = self.advance()?;
        Some(ChunkClaim { range, slot })
    }

    /// Atomically take the range at the cursor and advance it by one chunk.
    pub fn advance(&self) -> Option<ByteRange> {
        let mut next = self.next_offset.lock();
        let start = *next;
        if start >= self.content_length {
            return None;
        }

        let end = start
            .saturating_add(self.chunk_size - 1)
            .min(self.content_length - 1);
        *next = start.saturating_add(self.chunk_size);

        Some(ByteRange::new(start, end))
    }

    /// Stop handing out ranges and wake every worker waiting for a slot.
    pub fn close(&self) {
        self.window.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ranges_cover_content_exactly() {
        let allocator = OffsetAllocator::new(100, 30, 4);
        let ranges: Vec<_> = std::iter::from_fn(|| allocator.advance()).collect();

        assert_eq!(
            ranges,
            vec![
                ByteRange::new(0, 29),
                ByteRange::new(30, 59),
                ByteRange::new(60, 89),
                ByteRange::new(90, 99),
            ]
        );
        assert_eq!(allocator.chunk_count(), 4);
        assert!(allocator.advance().is_none());
    }

    #[test]
    fn test_exact_multiple_has_no_tail() {
        let allocator = OffsetAllocator::new(90, 30, 1);
        let ranges: Vec<_> = std::iter::from_fn(|| allocator.advance()).collect();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[2], ByteRange::new(60, 89));
    }

    #[test]
    fn test_empty_content_yields_nothing() {
        let allocator = OffsetAllocator::new(0, 30, 1);
        assert!(allocator.advance().is_none());
        assert_eq!(allocator.chunk_count(), 0);
    }

    #[test]
    fn test_spec_example_chunk_count() {
        let allocator = OffsetAllocator::new(100_000_000, 15_728_640, 4);
        assert_eq!(allocator.chunk_count(), 7);
    }

    #[tokio::test]
    async fn test_claim_waits_for_window_slot() {
        let allocator = Arc::new(OffsetAllocator::new(100, 10, 2));

        let first = allocator.claim().await.unwrap();
        let _second = allocator.claim().await.unwrap();

        let pending = {
            let allocator = Arc::clone(&allocator);
            tokio::spawn(async move { allocator.claim().await.map(|c| c.range) })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        // Writing the first chunk frees its slot.
        drop(first.into_chunk(Bytes::from_static(&[0; 10])));
        let third = pending.await.unwrap();
        assert_eq!(third, Some(ByteRange::new(20, 29)));
    }

    #[tokio::test]
    async fn test_close_releases_waiters() {
        let allocator = Arc::new(OffsetAllocator::new(100, 10, 1));
        let _held = allocator.claim().await.unwrap();

        let waiter = {
            let allocator = Arc::clone(&allocator);
            tokio::spawn(async move { allocator.claim().await.is_none() })
        };

        allocator.close();
        assert!(waiter.await.unwrap());
    }

    proptest! {
        #[test]
        fn prop_ranges_partition_content(len in 0u64..50_000, chunk in 1u64..5_000) {
            let allocator = OffsetAllocator::new(len, chunk, 1);
            let mut expected_start = 0;
            let mut previous_start = None;

            while let Some(range) = allocator.advance() {
                prop_assert_eq!(range.start, expected_start);
                prop_assert!(range.len() <= chunk);
                if let Some(prev) = previous_start {
                    prop_assert!(range.start > prev);
                }
                previous_start = Some(range.start);
                expected_start = range.end + 1;
            }

            prop_assert_eq!(expected_start, len);
        }
    }
}
