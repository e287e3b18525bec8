//! Batch scheduler: bounded-concurrency, order-preserving fan-out.
//!
//! Questions are split into contiguous batches. Batches run strictly one
//! after another; the questions inside a batch run concurrently. At most
//! `batch_size` calls are ever in flight.

use crate::client::CompletionClient;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::retry::{Attempted, RetryPolicy};
use futures::future::join_all;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Split `total` items into contiguous index ranges of at most `batch_size`.
///
/// A `batch_size` of 0 is treated as 1.
pub fn plan_batches(total: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..total)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(total))
        .collect()
}

/// Runs questions through the retry-wrapped client in batches.
pub struct BatchScheduler {
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
    batch_size: usize,
}

impl BatchScheduler {
    /// Create a scheduler.
    pub fn new(client: Arc<dyn CompletionClient>, retry: RetryPolicy, batch_size: usize) -> Self {
        Self {
            client,
            retry,
            batch_size: batch_size.max(1),
        }
    }

    /// Configured batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Answer every question. The output has the same length and order as the input.
    pub async fn run_all(
        &self,
        questions: &[String],
        reporter: &dyn ProgressReporter,
    ) -> Vec<Attempted> {
        let total = questions.len();
        let mut results = Vec::with_capacity(total);

        for (index, range) in plan_batches(total, self.batch_size).into_iter().enumerate() {
            reporter.report(ProgressEvent {
                completed: range.start,
                total,
                batch_size: self.batch_size,
            });

            let started = Instant::now();
            let batch = &questions[range.clone()];
            let settled = join_all(
                batch
                    .iter()
                    .map(|question| self.retry.run(self.client.as_ref(), question)),
            )
            .await;

            let failures = settled.iter().filter(|a| !a.is_success()).count();
            debug!(
                batch = index,
                start = range.start,
                size = batch.len(),
                failures,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Batch settled"
            );

            results.extend(settled);
        }

        reporter.finish();
        results
    }
}
