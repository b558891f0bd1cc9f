//! Post-download installation.
//!
//! Once a download has been published, an archive usually needs more work:
//! - SHA-256 verification (`checksum`)
//! - zip / tar.gz extraction with path-traversal checks (`extractor`)
//! - A completion marker so finished installs are not repeated (`marker`)
//! - The workflow tying these to the downloader (`installer`)

mod checksum;
mod error;
mod extractor;
mod installer;
mod marker;

pub use checksum::{calculate_file_checksum, normalize_digest, verify_checksum};
pub use error::{InstallError, InstallResult};
pub use extractor::{extract, ArchiveKind};
pub use installer::{
    InstallOptions, InstallProgressCallback, InstallReport, InstallStage, PackageInstaller,
};
pub use marker::{FinishedMarker, DEFAULT_MARKER_NAME};
