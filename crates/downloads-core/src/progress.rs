//! Progress reporting for long log scans.
//!
//! The scan calls a [`ProgressObserver`] after every row; [`Throttled`] keeps
//! the real observer to a bounded cadence.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::info;

/// Snapshot of a scan in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    /// Data rows read so far, malformed rows included.
    pub rows_read: u64,
    /// Rows that passed the filter so far.
    pub rows_kept: u64,
}

pub trait ProgressObserver {
    fn on_progress(&mut self, progress: &ScanProgress);
}

/// Observer that ignores every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _progress: &ScanProgress) {}
}

/// Logs one info line per update for the named source.
#[derive(Debug, Clone)]
pub struct LogProgress {
    source: PathBuf,
}

impl LogProgress {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl ProgressObserver for LogProgress {
    fn on_progress(&mut self, progress: &ScanProgress) {
        info!(
            "{}: {} rows read, {} kept so far",
            self.source.display(),
            progress.rows_read,
            progress.rows_kept
        );
    }
}

/// Forwards at most one update per `interval` of wall time to `inner`.
#[derive(Debug)]
pub struct Throttled<O> {
    inner: O,
    interval: Duration,
    last: Instant,
}

impl<O: ProgressObserver> Throttled<O> {
    pub fn new(inner: O, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            last: Instant::now(),
        }
    }
}

impl<O: ProgressObserver> ProgressObserver for Throttled<O> {
    fn on_progress(&mut self, progress: &ScanProgress) {
        let now = Instant::now();
        if now.duration_since(self.last) >= self.interval {
            self.last = now;
            self.inner.on_progress(progress);
        }
    }
}
