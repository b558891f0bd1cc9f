//! Concurrent, chunked, retrying HTTP downloads.
//!
//! This module downloads one large file from a primary URL with ordered
//! mirror fallbacks, including:
//! - Request validation and tunables (`request`)
//! - Length probing and ranged fetches over a pluggable transport (`http`)
//! - Non-overlapping offset allocation with a sliding window (`allocator`)
//! - A bounded pool of chunk workers (`worker`)
//! - In-order reassembly into the working file (`sequencer`)
//! - Retry and mirror fallback (`controller`)
//! - Atomic publish of the finished file (`finalize`)
//!
//! # Architecture
//!
//! ```text
//! ChunkedDownloader (controller)
//!         │
//!         ├── RetryPlan (retry / fallback / exhausted)
//!         │
//!         └── Attempt (one URL, fresh state)
//!                 ├── HttpTransport::probe
//!                 ├── OffsetAllocator ──► workers ──► mpsc ──► Sequencer ──► <dest>.tmp
//!                 └── HttpTransport::fetch_stream (length unknown)
//!
//! success: rename <dest>.tmp -> <dest>
//! ```
//!
//! Every attempt restarts from offset zero with a truncated working file.
//!
//! # Example
//!
//! ```ignore
//! use mirrorfetch::download::{ChunkedDownloader, DownloadRequest, ProgressCallback};
//!
//! let request = DownloadRequest::builder("https://a.example/f.zip", "/data/f.zip")
//!     .fallback("https://b.example/f.zip")
//!     .workers(8)
//!     .build()?;
//!
//! let progress: ProgressCallback = Box::new(|p| {
//!     if let Some(fraction) = p.fraction() {
//!         println!("{:.1}%", fraction * 100.0);
//!     }
//! });
//!
//! let outcome = ChunkedDownloader::new()?
//!     .download(&request, Some(&progress))
//!     .await?;
//! ```

mod allocator;
mod attempt;
mod controller;
mod error;
mod finalize;
mod http;
mod progress;
mod request;
mod sequencer;
mod worker;

pub use allocator::{Chunk, ChunkClaim, OffsetAllocator};
pub use attempt::AttemptPhase;
pub use controller::{ChunkedDownloader, DownloadOutcome, RetryPlan, Transition};
pub use error::{DownloadError, DownloadResult};
pub use http::{BodyStream, ByteRange, HttpTransport, ProbeResult, ReqwestTransport};
pub use progress::{DownloadProgress, ProgressCallback};
pub use request::{
    temp_path_for, DownloadRequest, DownloadRequestBuilder, DownloadSettings, DEFAULT_CHUNK_SIZE,
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BACKOFF, DEFAULT_TIMEOUT_SECS, DEFAULT_WORKERS,
    TEMP_SUFFIX,
};
