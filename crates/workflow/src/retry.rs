//! Retry policies and the exponential backoff loop.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::StepError;

/// Retry settings attached to one kind of step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Multiplier applied to the delay after each retry.
    pub backoff_coefficient: f64,
    /// Delay before the first retry.
    pub first_interval_ms: u64,
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Upper bound of a single delay.
    pub max_interval_ms: u64,
    /// Budget for all attempts and delays, counted from the first attempt.
    ///
    /// An attempt still running when it runs out is abandoned, and no retry
    /// is scheduled past it.
    pub total_timeout_ms: u64,
}

impl RetryPolicy {
    /// Policy for record store reads and replaces.
    pub const fn store() -> Self {
        Self {
            backoff_coefficient: 1.5,
            first_interval_ms: 1_000,
            max_attempts: 5,
            max_interval_ms: 360_000,
            total_timeout_ms: 3_600_000,
        }
    }

    /// Policy for notification sends.
    pub const fn notification() -> Self {
        Self {
            max_attempts: 10,
            ..Self::store()
        }
    }

    /// A single attempt, never retried.
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::store()
        }
    }

    /// Delay before the `retry`-th retry (1-based).
    ///
    /// `min(first_interval * backoff_coefficient^(retry - 1), max_interval)`
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let raw = self.first_interval_ms as f64 * self.backoff_coefficient.powi(exponent);
        let capped = raw.min(self.max_interval_ms as f64).max(0.0);
        Duration::from_millis(capped.round() as u64)
    }

    /// Returns the retry budget as a duration.
    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::store()
    }
}

/// Result of running an operation under a retry policy.
#[derive(Debug)]
pub struct Attempted<T> {
    /// Number of attempts made.
    pub attempts: u32,
    /// Value of the last attempt.
    pub result: Result<T, StepError>,
}

/// Runs `operation` until it succeeds, fails permanently, runs out of
/// attempts, or the policy's total timeout elapses.
///
/// An attempt cut off by the timeout counts as a transient failure.
pub async fn run_with_retry<T, F, Fut>(
    step_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StepError>>,
{
    let deadline = Instant::now() + policy.total_timeout();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let outcome = tokio::time::timeout_at(deadline, operation())
            .await
            .unwrap_or_else(|_| Err(StepError::transient("step timed out")));
        let error = match outcome {
            Ok(value) => {
                return Attempted {
                    attempts,
                    result: Ok(value),
                };
            }
            Err(e) => e,
        };

        if error.is_permanent() || attempts >= max_attempts {
            return Attempted {
                attempts,
                result: Err(error),
            };
        }

        let delay = policy.retry_delay(attempts);
        if Instant::now() + delay > deadline {
            tracing::warn!(step = step_name, attempts, "retry budget exhausted");
            return Attempted {
                attempts,
                result: Err(error),
            };
        }

        metrics::counter!("redemption_step_retries_total").increment(1);
        tracing::warn!(
            step = step_name,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "step attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
