//! Bounded retry with linear backoff for transient failures.

use std::future::Future;
use std::time::Duration;

use common::{Error, Result};
use tracing::{debug, warn};

use crate::lifecycle::LifecycleGuard;

/// Retry tuning. Defaults match the backend's observed recovery window.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff: Duration::from_millis(300),
        }
    }
}

/// Outcome of a retried job.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// The job finished (possibly with a non-transient or exhausted error).
    Done(Result<T>),
    /// Disposed mid-retry; nothing to report.
    Aborted,
}

/// Run `job`, retrying transient failures up to `policy.max_retries`
/// times with linearly increasing backoff (`base * (attempt + 1)`).
///
/// Non-transient failures propagate immediately. The guard is checked
/// before every attempt; a disposal observed mid-retry aborts silently.
pub async fn with_retry<T, F, Fut>(
    guard: &LifecycleGuard,
    policy: RetryPolicy,
    what: &'static str,
    mut job: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        if guard.is_disposed() {
            debug!(what, "Skipping attempt, orchestrator disposed");
            return RetryOutcome::Aborted;
        }

        match job().await {
            Ok(value) => return RetryOutcome::Done(Ok(value)),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let backoff = policy.base_backoff * (attempt + 1);
                warn!(
                    what,
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return RetryOutcome::Done(Err(e)),
        }
    }
}
