//! Retry logic.
//!
//! # Responsibilities
//! - Re-run a fallible async operation under a `RetryPolicy`
//! - Sleep with jittered exponential backoff between attempts
//! - Log every failed attempt with its attempt number
//!
//! # Design Decisions
//! - Only used for side effects that are safe to repeat (access restoration)
//! - Payment gateway calls are never retried here; the user re-initiates

use std::fmt::Display;
use std::future::Future;

use crate::resilience::backoff::RetryPolicy;

/// Run `op` until it succeeds or the policy's attempts are exhausted.
///
/// `op` receives the 1-based attempt number. The last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= policy.max_attempts => {
                tracing::warn!(operation, attempt, error = %e, "Giving up after final attempt");
                return Err(e);
            }
            Err(e) => {
                attempt += 1;
                let delay = policy.delay_before(attempt);
                tracing::info!(operation, attempt, delay = ?delay, error = %e, "Retrying after failure");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
