//! Lock-contention retry for cache database operations
//!
//! Several workers write the response cache at once. SQLite serializes
//! writers and reports contention as "database is locked"; those errors are
//! retried with exponential backoff until `max_wait_ms` elapses.

use crate::error::CacheError;
use std::time::{Duration, Instant};

/// Initial delay between attempts
const INITIAL_BACKOFF_MS: u64 = 10;

/// Delay cap
const MAX_BACKOFF_MS: u64 = 1000;

/// Retry a cache database operation while it fails with lock contention.
///
/// Any other error is returned immediately. Once `max_wait_ms` has elapsed
/// the last lock error is returned with the attempt count attached.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T, CacheError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, CacheError>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    let elapsed_ms = start_time.elapsed().as_millis();
                    if elapsed_ms > 2000 {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Cache operation succeeded after significant lock wait"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Cache operation succeeded after retry"
                        );
                    }
                }
                return Ok(result);
            }
            Err(err) if !err.is_lock_contention() => return Err(err),
            Err(err) => {
                let elapsed = start_time.elapsed();

                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        max_wait_ms,
                        "Cache database still locked, giving up"
                    );
                    return Err(CacheError::Database(format!(
                        "{} after {} attempts ({} ms elapsed, max {} ms)",
                        err,
                        attempt,
                        elapsed.as_millis(),
                        max_wait_ms
                    )));
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    remaining_ms = max_duration.saturating_sub(elapsed).as_millis(),
                    "Cache database locked, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
    }
}
