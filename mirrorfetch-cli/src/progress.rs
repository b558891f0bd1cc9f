//! Terminal progress display.
//!
//! A byte bar while the length is known, a spinner with a running byte
//! count while it is not. Stage transitions after the download are printed
//! as check-marked lines.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use mirrorfetch::download::{DownloadProgress, ProgressCallback};
use mirrorfetch::install::{InstallProgressCallback, InstallStage};

const BAR_TEMPLATE: &str =
    "{spinner:.green} {msg} [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({binary_bytes_per_sec}, {eta})";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg} {bytes} ({binary_bytes_per_sec})";

/// Shared handle to the download bar.
#[derive(Clone)]
pub struct DownloadBar {
    bar: ProgressBar,
}

impl DownloadBar {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.set_message("Connecting");
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Callback feeding the downloader's progress into the bar.
    pub fn download_callback(&self) -> ProgressCallback {
        let bar = self.bar.clone();
        let determinate = AtomicBool::new(false);
        Box::new(move |progress| update(&bar, &determinate, progress))
    }

    /// Callback printing installation stages.
    pub fn stage_callback(&self) -> InstallProgressCallback {
        let bar = self.bar.clone();
        Box::new(move |stage, fraction, message| {
            if stage == InstallStage::Downloading {
                if fraction >= 1.0 {
                    bar.finish_and_clear();
                    println!("{} {}", style("✓").green(), message);
                }
                return;
            }
            if fraction >= 1.0 {
                println!("{} {}", style("✓").green(), message);
            } else {
                println!("{} {}", style("→").cyan(), message);
            }
        })
    }

    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

fn update(bar: &ProgressBar, determinate: &AtomicBool, progress: &DownloadProgress) {
    match progress.total_bytes {
        Some(total) => {
            if bar.length() != Some(total) {
                bar.set_length(total);
            }
            if !determinate.swap(true, Ordering::Relaxed) {
                bar.set_style(bar_style());
            }
        }
        None => {
            if determinate.swap(false, Ordering::Relaxed) {
                bar.set_style(spinner_style());
            }
        }
    }

    bar.set_message(label(progress));
    bar.set_position(progress.bytes_written);
}

fn label(progress: &DownloadProgress) -> String {
    match (progress.url_index, progress.is_retrying()) {
        (_, false) => "Downloading".to_string(),
        (0, true) => format!("Resuming (attempt {})", progress.attempt),
        (mirror, true) => format!("Resuming from mirror {} (attempt {})", mirror, progress.attempt),
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template(SPINNER_TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_spinner())
}
