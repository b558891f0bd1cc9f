//! Download-and-install workflow.
//!
//! Runs the downloader, then the optional post-download steps in order:
//! checksum verification, extraction, the finished marker and removal of
//! the archive.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::checksum::{normalize_digest, verify_checksum};
use super::error::{InstallError, InstallResult};
use super::extractor::{extract, ArchiveKind};
use super::marker::FinishedMarker;
use crate::download::{
    ChunkedDownloader, DownloadOutcome, DownloadRequest, HttpTransport, ProgressCallback,
    ReqwestTransport,
};

/// Progress callback for installation stages.
///
/// # Arguments
///
/// * `stage` - Current installation stage
/// * `progress` - Progress within the stage (0.0 - 1.0)
/// * `message` - Human-readable message
pub type InstallProgressCallback = Box<dyn Fn(InstallStage, f64, &str) + Send + Sync>;

/// Installation stages for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    /// Downloading the archive.
    Downloading,
    /// Verifying the SHA-256 digest.
    Verifying,
    /// Extracting archive contents.
    Extracting,
    /// Writing the finished marker.
    Marking,
    /// Removing the archive.
    Cleanup,
    /// Installation complete.
    Complete,
}

impl InstallStage {
    /// Get a human-readable name for the stage.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Downloading => "Downloading",
            Self::Verifying => "Verifying",
            Self::Extracting => "Extracting",
            Self::Marking => "Marking",
            Self::Cleanup => "Cleaning up",
            Self::Complete => "Complete",
        }
    }
}

/// Optional post-download steps.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Expected SHA-256 digest (hex, any case).
    pub sha256: Option<String>,
    /// Extract the archive into this directory.
    pub extract_to: Option<PathBuf>,
    /// Archive format; detected from the file name when `None`.
    pub format: Option<ArchiveKind>,
    /// Keep the archive after a successful extraction.
    pub keep_archive: bool,
    /// Marker written into the extraction directory.
    pub marker: FinishedMarker,
}

impl InstallOptions {
    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into());
        self
    }

    pub fn with_extract_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extract_to = Some(dir.into());
        self
    }

    pub fn with_format(mut self, format: ArchiveKind) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_keep_archive(mut self, keep: bool) -> Self {
        self.keep_archive = keep;
        self
    }

    pub fn with_marker(mut self, marker: FinishedMarker) -> Self {
        self.marker = marker;
        self
    }
}

/// Result of an installation.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Download summary; `None` when the install was skipped.
    pub download: Option<DownloadOutcome>,
    /// The extraction directory already carried a finished marker.
    pub skipped: bool,
    /// Verified digest, lowercase.
    pub checksum: Option<String>,
    /// Number of files extracted.
    pub files_extracted: Option<usize>,
    /// Path of the finished marker, written now or found from before.
    pub marker: Option<PathBuf>,
    /// Completion time recorded in an existing marker, for skipped installs.
    pub finished_at: Option<String>,
    /// The archive was deleted after extraction.
    pub archive_removed: bool,
}

impl InstallReport {
    fn skipped(marker: PathBuf, finished_at: Option<String>) -> Self {
        Self {
            download: None,
            skipped: true,
            checksum: None,
            files_extracted: None,
            marker: Some(marker),
            finished_at,
            archive_removed: false,
        }
    }
}

/// Package installer.
///
/// Handles the complete workflow: download, verification, extraction and
/// completion marker.
pub struct PackageInstaller<T = ReqwestTransport> {
    downloader: ChunkedDownloader<T>,
    on_stage: Option<InstallProgressCallback>,
}

impl<T: HttpTransport> PackageInstaller<T> {
    pub fn new(downloader: ChunkedDownloader<T>) -> Self {
        Self {
            downloader,
            on_stage: None,
        }
    }

    /// Report stage transitions to `callback`.
    pub fn with_stage_callback(mut self, callback: InstallProgressCallback) -> Self {
        self.on_stage = Some(callback);
        self
    }

    pub fn downloader(&self) -> &ChunkedDownloader<T> {
        &self.downloader
    }

    /// Download `request` and run the steps selected in `options`.
    ///
    /// When extracting into a directory that already has the finished marker
    /// nothing is downloaded and the report is marked as skipped.
    pub async fn install(
        &self,
        request: &DownloadRequest,
        options: &InstallOptions,
        progress: Option<&ProgressCallback>,
        cancel: CancellationToken,
    ) -> InstallResult<InstallReport> {
        let report = |stage: InstallStage, fraction: f64, message: &str| {
            if let Some(cb) = &self.on_stage {
                cb(stage, fraction, message);
            }
        };

        // Resolve everything that can fail before spending bandwidth.
        let expected = options
            .sha256
            .as_deref()
            .map(normalize_digest)
            .transpose()?;
        let archive = request.destination().to_path_buf();
        let format = match &options.extract_to {
            Some(_) => Some(
                options
                    .format
                    .or_else(|| ArchiveKind::detect(&archive))
                    .ok_or_else(|| InstallError::UnknownArchiveFormat(archive.clone()))?,
            ),
            None => None,
        };

        if let Some(dir) = &options.extract_to {
            if options.marker.exists(dir) {
                let finished_at = options.marker.read(dir).await;
                info!(
                    dir = %dir.display(),
                    finished_at = finished_at.as_deref().unwrap_or("unknown"),
                    "Already installed, skipping"
                );
                report(InstallStage::Complete, 1.0, "Already installed");
                return Ok(InstallReport::skipped(
                    options.marker.path(dir),
                    finished_at,
                ));
            }
        }

        // Stage 1: Download
        report(
            InstallStage::Downloading,
            0.0,
            &format!("Downloading {}", request.primary_url()),
        );
        let outcome = self
            .downloader
            .download_cancellable(request, progress, cancel)
            .await?;
        report(
            InstallStage::Downloading,
            1.0,
            &format!("Downloaded {} bytes", outcome.bytes),
        );

        // Stage 2: Verify
        if let Some(expected) = &expected {
            report(InstallStage::Verifying, 0.0, "Verifying checksum...");
            let path = archive.clone();
            let digest = expected.clone();
            let verified = tokio::task::spawn_blocking(move || verify_checksum(&path, &digest))
                .await
                .map_err(|e| InstallError::TaskFailed(e.to_string()))?;
            if let Err(e) = verified {
                remove_archive(&archive).await;
                return Err(e);
            }
            report(InstallStage::Verifying, 1.0, "Checksum verified");
        }

        let mut result = InstallReport {
            download: Some(outcome),
            skipped: false,
            checksum: expected,
            files_extracted: None,
            marker: None,
            finished_at: None,
            archive_removed: false,
        };

        // Stage 3: Extract
        let (Some(dir), Some(format)) = (&options.extract_to, format) else {
            report(InstallStage::Complete, 1.0, "Download complete");
            return Ok(result);
        };

        report(InstallStage::Extracting, 0.0, "Extracting archive...");
        let files = {
            let archive = archive.clone();
            let dir = dir.clone();
            tokio::task::spawn_blocking(move || extract(&archive, &dir, format))
                .await
                .map_err(|e| InstallError::TaskFailed(e.to_string()))??
        };
        result.files_extracted = Some(files);
        report(
            InstallStage::Extracting,
            1.0,
            &format!("Extracted {} files", files),
        );

        // Stage 4: Marker
        report(InstallStage::Marking, 0.0, "Writing finished marker...");
        result.marker = Some(options.marker.write(dir).await?);
        report(InstallStage::Marking, 1.0, "Marker written");

        // Stage 5: Cleanup
        if !options.keep_archive {
            report(InstallStage::Cleanup, 0.0, "Removing archive...");
            result.archive_removed = remove_archive(&archive).await;
            report(InstallStage::Cleanup, 1.0, "Cleanup complete");
        }

        info!(
            archive = %archive.display(),
            dir = %dir.display(),
            files,
            "Install complete"
        );
        report(InstallStage::Complete, 1.0, "Installation complete");
        Ok(result)
    }
}

/// Best-effort archive removal; returns whether the file is gone.
async fn remove_archive(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove archive");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(InstallStage::Downloading.name(), "Downloading");
        assert_eq!(InstallStage::Verifying.name(), "Verifying");
        assert_eq!(InstallStage::Extracting.name(), "Extracting");
        assert_eq!(InstallStage::Marking.name(), "Marking");
        assert_eq!(InstallStage::Cleanup.name(), "Cleaning up");
        assert_eq!(InstallStage::Complete.name(), "Complete");
    }

    #[test]
    fn test_options_builder() {
        let options = InstallOptions::default()
            .with_sha256("AB".repeat(32))
            .with_extract_to("/opt/pkg")
            .with_format(ArchiveKind::Zip)
            .with_keep_archive(true);

        assert_eq!(options.extract_to, Some(PathBuf::from("/opt/pkg")));
        assert_eq!(options.format, Some(ArchiveKind::Zip));
        assert!(options.keep_archive);
        assert_eq!(options.marker.name(), ".finished");
    }

    #[test]
    fn test_skipped_report() {
        let report = InstallReport::skipped(
            PathBuf::from("/opt/pkg/.finished"),
            Some("2026-01-02T03:04:05+00:00".to_string()),
        );
        assert!(report.skipped);
        assert!(report.download.is_none());
        assert_eq!(report.marker, Some(PathBuf::from("/opt/pkg/.finished")));
        assert_eq!(
            report.finished_at.as_deref(),
            Some("2026-01-02T03:04:05+00:00")
        );
    }
}
