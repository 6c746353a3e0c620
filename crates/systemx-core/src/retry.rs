//! Bounded retry with exponential backoff for adapter calls.
//!
//! Every adapter call runs under a per-call deadline; a timed-out or
//! exhausted call becomes a recorded step failure, never a process hang and
//! never an unbounded retry storm.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::{Error, Result};

/// Retry policy for one adapter call site.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Deadline applied to each individual attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        exp.min(self.max_delay)
    }

    /// Run `op`, retrying transient failures with exponential backoff.
    /// Non-transient errors fail immediately.
    pub async fn call<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_err: Option<Error> = None;

        for attempt in 0..self.max_attempts {
            let outcome = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout {
                    operation: operation.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient adapter failure, backing off"
                    );
                    last_err = Some(err);
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }

        // Reachable only when max_attempts is zero.
        Err(last_err.unwrap_or(Error::Timeout {
            operation: operation.to_string(),
            timeout_secs: self.timeout.as_secs(),
        }))
    }
}
