//! The `get` command: download a file, then optionally verify and extract it.

use std::path::PathBuf;

use clap::Args;
use console::style;
use mirrorfetch::config::{format_size, ConfigFile};
use mirrorfetch::download::{ChunkedDownloader, DownloadRequest};
use mirrorfetch::install::{ArchiveKind, FinishedMarker, InstallOptions, PackageInstaller};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::CliError;
use crate::progress::DownloadBar;

/// Arguments for `mirrorfetch get`.
#[derive(Debug, Args)]
pub struct GetArgs {
    /// Primary URL
    pub url: String,

    /// Where to save the file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Mirror URL, tried in order after the primary (repeatable)
    #[arg(long = "mirror", value_name = "URL")]
    pub mirrors: Vec<String>,

    /// Chunk size in bytes
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<u64>,

    /// Number of concurrent chunk downloads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Retries per URL after the first attempt
    #[arg(long)]
    pub retries: Option<u32>,

    /// Expected SHA-256 digest of the file
    #[arg(long, value_name = "HEX")]
    pub sha256: Option<String>,

    /// Extract the downloaded archive into this directory
    #[arg(long, value_name = "DIR")]
    pub extract_to: Option<PathBuf>,

    /// Archive format (zip, tar-gz); detected from the file name by default
    #[arg(long)]
    pub format: Option<ArchiveKind>,

    /// Keep the archive after extracting it
    #[arg(long)]
    pub keep_archive: bool,
}

/// Load config, falling back to defaults with a warning.
fn load_config() -> ConfigFile {
    ConfigFile::load().unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring unreadable config file");
        ConfigFile::default()
    })
}

/// Run the `get` command.
pub fn run(args: GetArgs) -> Result<(), CliError> {
    let config = load_config();

    let mut settings = config.download_settings();
    if let Some(chunk_size) = args.chunk_size {
        settings = settings.with_chunk_size(chunk_size);
    }
    if let Some(workers) = args.workers {
        settings = settings.with_workers(workers);
    }
    if let Some(retries) = args.retries {
        settings = settings.with_max_retries(retries);
    }

    let request = DownloadRequest::builder(&args.url, &args.output)
        .fallbacks(&args.mirrors)
        .settings(&settings)
        .build()?;

    let mut options = InstallOptions::default()
        .with_keep_archive(args.keep_archive || config.install.keep_archive)
        .with_marker(FinishedMarker::new(config.install.marker_name.clone()));
    options.sha256 = args.sha256.clone();
    options.extract_to = args.extract_to.clone();
    options.format = args.format;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nCancelling...");
            cancel.cancel();
        })
        .map_err(|e| CliError::Runtime(format!("failed to install Ctrl-C handler: {}", e)))?;
    }

    println!(
        "Downloading {} -> {}",
        style(request.primary_url()).bold(),
        request.destination().display()
    );
    if !args.mirrors.is_empty() {
        println!("  {} mirror(s) available", args.mirrors.len());
    }
    println!(
        "  {} chunks, {} workers, {} retries per URL",
        format_size(request.chunk_size() as usize),
        request.concurrent_workers(),
        request.max_retries_per_url()
    );

    let bar = DownloadBar::new();
    let progress = bar.download_callback();
    let installer = PackageInstaller::new(ChunkedDownloader::from_settings(&settings)?)
        .with_stage_callback(bar.stage_callback());

    let result = runtime.block_on(installer.install(&request, &options, Some(&progress), cancel));
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            bar.abandon();
            return Err(e.into());
        }
    };

    if report.skipped {
        match &report.finished_at {
            Some(at) => println!("Already installed on {}, nothing to do.", at),
            None => println!("Already installed, nothing to do."),
        }
        if let Some(marker) = &report.marker {
            println!("  remove {} to reinstall", marker.display());
        }
        return Ok(());
    }

    if let Some(outcome) = &report.download {
        println!(
            "{} Saved {} ({}) from {}",
            style("✓").green(),
            outcome.path.display(),
            format_size(outcome.bytes as usize),
            outcome.url
        );
        if outcome.attempts > 1 {
            println!("  took {} attempts", outcome.attempts);
        }
    }

    Ok(())
}
