//! Retry logic with exponential backoff for provider calls

use crate::error::{Result, TrackerError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier (typically 2.0 for exponential backoff)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Create a policy with fast retries (for testing)
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }

    /// Backoff before the given retry (1-based)
    fn backoff_duration(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let backoff = Duration::from_millis(backoff_ms.min(u64::MAX as f64) as u64);

        backoff.min(self.max_backoff)
    }

    /// Execute an async operation, retrying transient failures
    ///
    /// Non-transient errors (bad symbol, auth failure, parse error) are
    /// returned immediately. After `max_attempts` the last error is returned.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            debug!(operation = operation_name, attempt = attempt + 1, "attempting");

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(
                            operation = operation_name,
                            retries = attempt,
                            "succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if !e.is_transient() {
                        debug!(operation = operation_name, error = %e, "non-retryable error");
                        return Err(e);
                    }

                    if attempt + 1 < attempts {
                        let backoff = self.backoff_duration(attempt + 1);
                        warn!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            max_attempts = attempts,
                            error = %e,
                            ?backoff,
                            "transient failure, retrying"
                        );
                        sleep(backoff).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let error = last_error
            .unwrap_or_else(|| TrackerError::Other("Retry failed with no error".to_string()));

        warn!(operation = operation_name, attempts, error = %error, "giving up");

        Err(error)
    }
}
