//! mirrorfetch - reliable downloads of large archives from mirrored URLs.
//!
//! The library is organised around a concurrent, chunked, retrying
//! downloader ([`download`]) and the collaborators that run once a file has
//! been published ([`install`]): checksum verification, archive extraction
//! and a finished marker.
//!
//! ```ignore
//! use mirrorfetch::download::{ChunkedDownloader, DownloadRequest};
//!
//! let request = DownloadRequest::builder("https://example.com/model.tar.gz", "model.tar.gz")
//!     .fallback("https://mirror.example.com/model.tar.gz")
//!     .build()?;
//!
//! let downloader = ChunkedDownloader::new()?;
//! let outcome = downloader.download(&request, None).await?;
//! println!("{} bytes from {}", outcome.bytes, outcome.url);
//! ```

pub mod config;
pub mod download;
pub mod install;
pub mod logging;
