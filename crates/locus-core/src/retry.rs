//! Bounded exponential backoff.
//!
//! Used by the worker pool when the containment oracle is unavailable or
//! event publication fails, and by the engine binary for its startup
//! connections.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// How often and how patiently to retry a failing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; `0` is treated as `1`.
    pub const fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            initial_backoff,
            max_backoff,
        }
    }

    /// A policy that never retries.
    pub const fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Total attempts including the first.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Start a fresh backoff sequence.
    pub const fn backoff(&self) -> Backoff {
        Backoff {
            policy: *self,
            failures: 0,
            next: self.initial_backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(100), Duration::from_secs(5))
    }
}

/// One running backoff sequence.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    failures: u32,
    next: Duration,
}

impl Backoff {
    /// Record a failed attempt and return how long to wait before the
    /// next one, or `None` when the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.policy.max_attempts {
            return None;
        }
        let delay = self.next.min(self.policy.max_backoff);
        self.next = self.next.saturating_mul(2).min(self.policy.max_backoff);
        Some(delay)
    }

    /// Failed attempts recorded so far.
    pub const fn failures(&self) -> u32 {
        self.failures
    }
}

/// Run `op` until it succeeds or `policy` gives up, sleeping between tries.
///
/// Every failure is logged with `what` and the attempt number.
///
/// # Errors
///
/// Returns the last error once all attempts have failed.
pub async fn retry_async<T, E, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: core::fmt::Display,
{
    let mut backoff = policy.backoff();
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let attempt = backoff.failures().saturating_add(1);
                let Some(delay) = backoff.next_delay() else {
                    warn!(what, attempt, max_attempts = policy.max_attempts(), error = %e, "giving up");
                    return Err(e);
                };
                warn!(
                    what,
                    attempt,
                    max_attempts = policy.max_attempts(),
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
