//! Progress reporting for batch processing.
//!
//! The scheduler emits one [`ProgressEvent`] per batch. Reporters are
//! fire-and-forget sinks: they return nothing and must not panic.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{info, warn};

/// Emitted when a batch is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Index of the first question in the batch (questions already done).
    pub completed: usize,
    /// Total number of questions in the run.
    pub total: usize,
    /// Configured batch size.
    pub batch_size: usize,
}

impl ProgressEvent {
    /// Fraction of questions finished, in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.completed as f64 / self.total as f64).min(1.0)
        }
    }

    /// Last question index (exclusive) covered by this batch.
    pub fn batch_end(&self) -> usize {
        (self.completed + self.batch_size).min(self.total)
    }

    /// Human-readable status line.
    pub fn status(&self) -> String {
        format!(
            "Processing questions {}-{} of {}",
            self.completed + 1,
            self.batch_end(),
            self.total
        )
    }
}

/// Receives progress events from the scheduler.
pub trait ProgressReporter: Send + Sync {
    /// Handle one progress event.
    fn report(&self, event: ProgressEvent);

    /// Called once after the last batch settles.
    fn finish(&self) {}
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

/// Logs each event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, event: ProgressEvent) {
        info!(
            completed = event.completed,
            total = event.total,
            batch_size = event.batch_size,
            percent = (event.fraction() * 100.0).round(),
            "{}",
            event.status()
        );
    }
}

/// Terminal progress bar.
#[derive(Debug, Clone)]
pub struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    /// Create a progress bar sized to `total` questions.
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        match ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) | {msg}",
        ) {
            Ok(style) => bar.set_style(style.progress_chars("█▓▒░")),
            Err(e) => warn!(error = %e, "Invalid progress template, using default style"),
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl ProgressReporter for BarReporter {
    fn report(&self, event: ProgressEvent) {
        self.bar.set_position(event.completed as u64);
        self.bar.set_message(event.status());
    }

    fn finish(&self) {
        self.bar.finish_with_message("Complete!");
    }
}
