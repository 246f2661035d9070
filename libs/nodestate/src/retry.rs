//! Bounded retry of optimistic-concurrency conflicts.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::StoreError;

/// Errors that can tell a retryable version conflict apart from everything
/// else, and that can express "retries exhausted".
pub trait ConflictAware: Sized {
    fn is_conflict(&self) -> bool;

    /// Terminal error returned once `attempts` conflicts have been seen.
    fn exhausted(attempts: u32, last: Self) -> Self;
}

impl ConflictAware for StoreError {
    fn is_conflict(&self) -> bool {
        StoreError::is_conflict(self)
    }

    fn exhausted(attempts: u32, last: Self) -> Self {
        StoreError::Persistence {
            attempts,
            last_error: last.to_string(),
        }
    }
}

/// How many times to run a read-modify-write before giving up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub backoff: Duration,
    /// Multiplier applied to the delay after each conflict.
    pub factor: f64,
    /// Upper bound on a single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(10),
            factor: 1.0,
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.factor.max(1.0)).min(self.max_backoff)
    }
}

/// Run `op` until it succeeds, fails with a non-conflict error, or has hit
/// `policy.max_attempts` conflicts.
///
/// `op` must perform the whole read-modify-write on every call, starting from
/// a fresh read, so that a retried attempt never writes stale data.
pub async fn retry_on_conflict<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ConflictAware + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_conflict() => {
                if attempt >= max_attempts {
                    warn!(attempts = attempt, error = %e, "Conflict retries exhausted");
                    return Err(E::exhausted(attempt, e));
                }
                debug!(attempt, error = %e, "Conflict, retrying");
                tokio::time::sleep(delay).await;
                delay = policy.next_delay(delay);
            }
            Err(e) => return Err(e),
        }
    }
}
