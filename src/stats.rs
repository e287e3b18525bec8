//! Timing statistics over one run.

use crate::error::{Result, SheetQaError};
use serde::Serialize;
use std::time::Duration;

/// Aggregate timing summary for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatistics {
    /// Number of questions answered (or attempted).
    pub question_count: usize,
    /// Sum of per-question processing times, in seconds.
    pub total_seconds: f64,
    /// Mean per-question processing time, in seconds.
    pub average_seconds: f64,
    /// Longest per-question processing time, in seconds.
    pub max_seconds: f64,
    /// Shortest per-question processing time, in seconds.
    pub min_seconds: f64,
    /// Wall-clock time of the whole run.
    #[serde(serialize_with = "as_seconds")]
    pub wall_clock: Duration,
}

impl RunStatistics {
    /// Summarize per-question durations (seconds) in a single pass.
    ///
    /// Failed questions are included at their recorded duration of 0.
    pub fn summarize(durations: &[f64]) -> Result<Self> {
        if durations.is_empty() {
            return Err(SheetQaError::EmptyInput);
        }

        let (sum, max, min) = durations.iter().fold(
            (0.0_f64, f64::NEG_INFINITY, f64::INFINITY),
            |(sum, max, min), &d| (sum + d, max.max(d), min.min(d)),
        );

        Ok(Self {
            question_count: durations.len(),
            total_seconds: sum,
            average_seconds: sum / durations.len() as f64,
            max_seconds: max,
            min_seconds: min,
            wall_clock: Duration::ZERO,
        })
    }

    /// Attach the run's wall-clock time.
    pub fn with_wall_clock(mut self, wall_clock: Duration) -> Self {
        self.wall_clock = wall_clock;
        self
    }

    /// Format as a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Questions: {} | Total: {:.2}s | Avg: {:.2}s | Max: {:.2}s | Min: {:.2}s | Wall clock: {:.2}s",
            self.question_count,
            self.total_seconds,
            self.average_seconds,
            self.max_seconds,
            self.min_seconds,
            self.wall_clock.as_secs_f64()
        )
    }
}

fn as_seconds<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}
