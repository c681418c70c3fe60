//! Bounded retry for upstream calls.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::error::ApiError;

/// How many times to try and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Ceiling for server-requested `Retry-After` delays
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_retry_after: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, given the failure of `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32, err: &ApiError) -> Duration {
        if let Some(requested) = err.get_retry_after() {
            return requested.min(self.max_retry_after);
        }
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor)
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// Connection failures, timeouts, 5xx and 429 are retried; anything else is
/// returned immediately.
pub async fn execute_with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = err.is_transient() || err.is_rate_limited();
                if !retryable || attempt >= max_attempts {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt, &err);
                debug!(
                    provider = err.provider,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after: {}",
                    err.message
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
