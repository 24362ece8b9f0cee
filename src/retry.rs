//! Bounded retry with a fixed inter-attempt delay
//!
//! Install and cleanup steps talk to an eventually-consistent control plane,
//! so transient failures are expected. This module wraps any fallible async
//! operation in a bounded number of attempts with a fixed delay between
//! them. Cancellation is never retried: a cancelled operation propagates
//! immediately, and the delay itself is interruptible.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::Error;

/// Retry policy for a single orchestration step
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts (the first call counts as attempt 1)
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt count and delay
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Execute an async operation with bounded retries and a fixed delay.
///
/// Returns the first success, or [`Error::RetriesExhausted`] wrapping the
/// last failure once `max_attempts` invocations have failed. A cancelled
/// token short-circuits both the next attempt and the inter-attempt sleep
/// with [`Error::Cancelled`].
pub async fn retry_fixed<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(Error::cancelled(operation_name));
        }

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                if attempt == max_attempts {
                    return Err(Error::retries_exhausted(operation_name, max_attempts, e));
                }

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = policy.delay.as_millis() as u64,
                    "Operation failed, retrying"
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::cancelled(operation_name)),
                    _ = tokio::time::sleep(policy.delay) => {}
                }
            }
        }
    }

    // max_attempts >= 1, so the loop always returns
    unreachable!("retry loop exits via return")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let result = retry_fixed(&policy, "op", &cancel, || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let policy = RetryPolicy::new(5, Duration::from_secs(3));
        let cancel = CancellationToken::new();

        let result = retry_fixed(&policy, "op", &cancel, || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::validation("transient"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invokes_exactly_max_attempts_then_wraps_last_failure() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let policy = RetryPolicy::new(4, Duration::from_secs(3));
        let cancel = CancellationToken::new();

        let result: Result<(), Error> = retry_fixed(&policy, "always-fails", &cancel, || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::validation("permanent"))
            }
        })
        .await;

        assert_eq!(count.load(Ordering::SeqCst), 4);
        match result.unwrap_err() {
            Error::RetriesExhausted {
                operation,
                attempts,
                source,
            } => {
                assert_eq!(operation, "always-fails");
                assert_eq!(attempts, 4);
                assert!(source.to_string().contains("permanent"));
            }
            other => panic!("expected RetriesExhausted, got: {}", other),
        }
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_skips_operation() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), Error> = retry_fixed(&policy, "op", &cancel, || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_error_is_not_retried() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let policy = RetryPolicy::new(5, Duration::from_secs(3));
        let cancel = CancellationToken::new();

        let result: Result<(), Error> = retry_fixed(&policy, "op", &cancel, || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::cancelled("inner call"))
            }
        })
        .await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
