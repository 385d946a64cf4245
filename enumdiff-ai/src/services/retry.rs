//! Retry/backoff around a single analysis service call
//!
//! Transient failures are retried with exponential backoff. Permanent
//! failures end the attempt immediately, fatal failures end it and must halt
//! the run. The result is an explicit [`RetryOutcome`] rather than a bare
//! `Result`, so callers see how many attempts were spent and why.

use crate::error::{ErrorKind, FailureClass, ServiceError};
use std::future::Future;
use std::time::Duration;

/// Backoff parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (default: 3, so 4 attempts total)
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before retry number `retry` (1-based). A server hint can
    /// lengthen the exponential delay but never shorten it; both are capped.
    pub fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let computed = if secs.is_finite() {
            Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
        } else {
            self.max_backoff
        };
        hint.map_or(computed, |hint| hint.max(computed)).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Terminal state of a retried call
#[derive(Debug, Clone, PartialEq)]
pub enum RetryState<T> {
    Success(T),
    /// Retry budget spent, or a permanent failure; carries the last error
    Exhausted(ServiceError),
    /// Authentication, authorization or quota failure
    Fatal(ServiceError),
}

/// Result of [`call_with_retry`]
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    /// Attempts made, at least 1
    pub attempts: u32,
    /// Kind of every failed attempt, in order
    pub failures: Vec<ErrorKind>,
    pub state: RetryState<T>,
}

impl<T> RetryOutcome<T> {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.state, RetryState::Success(_))
    }
}

/// Run `operation` until it succeeds, fails permanently or fatally, or the
/// retry budget is spent. `operation` receives the 1-based attempt number.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 0u32;
    let mut failures = Vec::new();

    loop {
        attempt += 1;

        let err = match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "Analysis call succeeded after retry"
                    );
                }
                return RetryOutcome {
                    attempts: attempt,
                    failures,
                    state: RetryState::Success(value),
                };
            }
            Err(err) => err,
        };

        failures.push(err.kind());

        match err.class() {
            FailureClass::Fatal => {
                tracing::error!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    "Fatal analysis service error"
                );
                return RetryOutcome {
                    attempts: attempt,
                    failures,
                    state: RetryState::Fatal(err),
                };
            }
            FailureClass::Permanent => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    "Request rejected, not retrying"
                );
                return RetryOutcome {
                    attempts: attempt,
                    failures,
                    state: RetryState::Exhausted(err),
                };
            }
            FailureClass::Transient if attempt > policy.max_retries => {
                tracing::warn!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %err,
                    "Retry budget exhausted"
                );
                return RetryOutcome {
                    attempts: attempt,
                    failures,
                    state: RetryState::Exhausted(err),
                };
            }
            FailureClass::Transient => {
                let delay = policy.delay_for(attempt, err.retry_after());
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient analysis service error, will retry after backoff"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
