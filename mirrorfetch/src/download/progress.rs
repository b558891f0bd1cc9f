//! Progress reporting for downloads.
//!
//! The sequencer reports every flush to a [`ProgressReporter`], which derives
//! throughput from the wall-clock time between successive reports and
//! forwards a [`DownloadProgress`] to the caller's callback.

use std::time::Instant;

/// Progress callback invoked from the download's coordinating task.
pub type ProgressCallback = Box<dyn Fn(&DownloadProgress) + Send + Sync>;

/// A single progress update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    /// Bytes committed to the working file in the current attempt.
    pub bytes_written: u64,
    /// Total length, or `None` when the server did not report one.
    pub total_bytes: Option<u64>,
    /// Throughput since the previous update, when there is one.
    pub bytes_per_second: Option<f64>,
    /// Index of the URL being downloaded (0 is the primary).
    pub url_index: usize,
    /// Attempt number against that URL, starting at 1.
    pub attempt: u32,
}

impl DownloadProgress {
    /// Completed fraction in `0.0..=1.0`, if the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(1.0),
            Some(total) => Some((self.bytes_written as f64 / total as f64).min(1.0)),
            None => None,
        }
    }

    /// Whether a UI should show an indeterminate indicator.
    pub fn is_indeterminate(&self) -> bool {
        self.total_bytes.is_none()
    }

    /// Whether this update belongs to a retry or a mirror.
    ///
    /// Useful for a "resuming" label; every attempt still restarts at
    /// offset zero.
    pub fn is_retrying(&self) -> bool {
        self.attempt > 1 || self.url_index > 0
    }
}

/// Per-attempt progress reporter.
pub(crate) struct ProgressReporter<'a> {
    callback: Option<&'a ProgressCallback>,
    total_bytes: Option<u64>,
    url_index: usize,
    attempt: u32,
    last: Option<(Instant, u64)>,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(
        callback: Option<&'a ProgressCallback>,
        total_bytes: Option<u64>,
        url_index: usize,
        attempt: u32,
    ) -> Self {
        Self {
            callback,
            total_bytes,
            url_index,
            attempt,
            last: None,
        }
    }

    /// Emit the zero-byte update that opens an attempt.
    pub(crate) fn start(&mut self) {
        self.record(0);
    }

    /// Report the cumulative number of bytes written.
    pub(crate) fn record(&mut self, bytes_written: u64) {
        self.record_at(bytes_written, Instant::now());
    }

    fn record_at(&mut self, bytes_written: u64, now: Instant) {
        let bytes_per_second = self.last.and_then(|(at, bytes)| {
            let elapsed = now.saturating_duration_since(at).as_secs_f64();
            (elapsed > 0.0).then(|| bytes_written.saturating_sub(bytes) as f64 / elapsed)
        });
        self.last = Some((now, bytes_written));

        if let Some(cb) = self.callback {
            cb(&DownloadProgress {
                bytes_written,
                total_bytes: self.total_bytes,
                bytes_per_second,
                url_index: self.url_index,
                attempt: self.attempt,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn collecting_callback() -> (ProgressCallback, Arc<Mutex<Vec<DownloadProgress>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Box::new(move |p| sink.lock().unwrap().push(*p));
        (callback, events)
    }

    #[test]
    fn test_fraction() {
        let mut progress = DownloadProgress {
            bytes_written: 250,
            total_bytes: Some(1000),
            bytes_per_second: None,
            url_index: 0,
            attempt: 1,
        };
        assert_eq!(progress.fraction(), Some(0.25));
        assert!(!progress.is_indeterminate());

        progress.total_bytes = None;
        assert_eq!(progress.fraction(), None);
        assert!(progress.is_indeterminate());

        progress.total_bytes = Some(0);
        assert_eq!(progress.fraction(), Some(1.0));
    }

    #[test]
    fn test_is_retrying() {
        let mut progress = DownloadProgress {
            bytes_written: 0,
            total_bytes: None,
            bytes_per_second: None,
            url_index: 0,
            attempt: 1,
        };
        assert!(!progress.is_retrying());
        progress.attempt = 2;
        assert!(progress.is_retrying());
        progress.attempt = 1;
        progress.url_index = 1;
        assert!(progress.is_retrying());
    }

    #[test]
    fn test_speed_from_successive_reports() {
        let (callback, events) = collecting_callback();
        let mut reporter = ProgressReporter::new(Some(&callback), Some(4000), 1, 2);

        let t0 = Instant::now();
        reporter.record_at(0, t0);
        reporter.record_at(1000, t0 + Duration::from_millis(500));
        reporter.record_at(3000, t0 + Duration::from_millis(1500));

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].bytes_per_second, None);
        assert_eq!(events[1].bytes_per_second, Some(2000.0));
        assert_eq!(events[2].bytes_per_second, Some(2000.0));
        assert!(events.iter().all(|e| e.url_index == 1 && e.attempt == 2));
        assert!(events.iter().all(|e| e.total_bytes == Some(4000)));
    }

    #[test]
    fn test_start_reports_unknown_total() {
        let (callback, events) = collecting_callback();
        let mut reporter = ProgressReporter::new(Some(&callback), None, 0, 1);
        reporter.start();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].bytes_written, 0);
        assert!(events[0].is_indeterminate());
    }

    #[test]
    fn test_reporter_without_callback() {
        let mut reporter = ProgressReporter::new(None, Some(10), 0, 1);
        reporter.start();
        reporter.record(10);
    }
}
