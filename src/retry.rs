//! Bounded exponential-backoff retry around a single completion call.

use crate::client::{Completion, CompletionClient, Fault};
use crate::config::RetryConfig;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Final outcome of answering one question.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted {
    /// The completion, or the last fault seen.
    pub result: Result<Completion, Fault>,
    /// Number of calls made.
    pub attempts: u32,
}

impl Attempted {
    /// Check if this is a success.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Retries transient faults with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a retry policy.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Maximum attempts per question.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Answer `question`, retrying transient faults.
    ///
    /// Never fails: the last fault is returned inside [`Attempted`].
    pub async fn run(&self, client: &dyn CompletionClient, question: &str) -> Attempted {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;

            let fault = match client.complete(question).await {
                Ok(completion) => {
                    return Attempted {
                        result: Ok(completion),
                        attempts,
                    };
                }
                Err(fault) => fault,
            };

            if !fault.is_retryable() {
                warn!(attempt = attempts, error = %fault, "Non-retryable fault");
                return Attempted {
                    result: Err(fault),
                    attempts,
                };
            }

            if attempts >= max_attempts {
                warn!(attempts, error = %fault, "Giving up after max attempts");
                return Attempted {
                    result: Err(fault),
                    attempts,
                };
            }

            let backoff = self.calculate_backoff(attempts);
            debug!(
                attempt = attempts,
                max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %fault,
                "Completion failed, retrying"
            );
            if !backoff.is_zero() {
                sleep(backoff).await;
            }
        }
    }

    /// Calculate backoff duration after a given attempt.
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let base = self.config.initial_backoff.as_millis() as f64;
        let multiplier = self.config.multiplier.powi(attempt as i32 - 1);
        let mut backoff_ms = base * multiplier;

        if self.config.jitter {
            // ±25%
            backoff_ms *= 1.0 + (rand::random::<f64>() - 0.5) * 0.5;
        }

        Duration::from_millis(backoff_ms as u64).min(self.config.max_backoff)
    }
}
