//! Readiness polling
//!
//! Polls a condition on a fixed tick interval until it holds, a ceiling
//! elapses, or the caller cancels. Timeout and cancellation produce
//! distinct errors: a timeout is a non-fatal warning during install, while
//! cancellation aborts the whole call chain.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::Error;

/// Poll interval and ceiling for a readiness wait
#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Time between condition checks
    pub interval: Duration,
    /// Maximum total time to wait for the condition
    pub ceiling: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            ceiling: Duration::from_secs(300),
        }
    }
}

/// Poll `check` until it returns `Ok(true)`, the ceiling elapses, or the
/// token is cancelled.
///
/// The condition is checked immediately on entry, then once per interval.
/// Check errors are treated as "not yet ready" and logged at trace level;
/// a condition that can fail permanently should not be polled through this
/// function.
pub async fn wait_for<F, Fut>(
    config: &ReadinessConfig,
    condition_name: &str,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<(), Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool, Error>>,
{
    let start = Instant::now();

    loop {
        if cancel.is_cancelled() {
            return Err(Error::cancelled(condition_name));
        }

        match check().await {
            Ok(true) => return Ok(()),
            Ok(false) => {
                trace!(condition = %condition_name, "Condition not yet met");
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                trace!(condition = %condition_name, error = %e, "Condition check failed, will retry");
            }
        }

        if start.elapsed() >= config.ceiling {
            return Err(Error::readiness_timeout(condition_name, start.elapsed()));
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::cancelled(condition_name)),
            _ = tokio::time::sleep(config.interval) => {}
        }
    }
}
