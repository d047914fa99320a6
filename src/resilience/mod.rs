//! Timeouts and bounded retries for external provider calls
//!
//! Every embedding and generation call runs under a per-attempt timeout.
//! Transient failures (rate limits, server errors, timeouts) are retried with
//! exponential backoff; permanent failures return immediately.

mod http;

pub use http::{error_from_response, error_from_transport};

use crate::config::ResilienceConfig;
use crate::error::{Result, ScriptRagError};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry and timeout policy for one class of external call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    timeout: Duration,
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(
        timeout: Duration,
        max_retries: usize,
        initial_backoff: Duration,
        max_backoff: Duration,
    ) -> Self {
        Self {
            timeout,
            max_retries,
            initial_backoff,
            max_backoff,
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    /// Single attempt, no retries
    pub fn no_retry(timeout: Duration) -> Self {
        Self::new(timeout, 0, Duration::ZERO, Duration::ZERO)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        let delay = self.initial_backoff.saturating_mul(1u32 << exponent);
        delay.min(self.max_backoff)
    }

    /// Run `call` under the timeout, retrying transient failures
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ScriptRagError::Timeout {
                    operation: operation.to_string(),
                    after: self.timeout,
                }),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        operation,
                        attempt,
                        self.max_retries + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(60),
            3,
            Duration::from_millis(500),
            Duration::from_secs(8),
        )
    }
}
