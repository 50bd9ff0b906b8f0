//! Retry logic with exponential backoff
//!
//! Two shapes of retry live here. [`BackoffPolicy`] computes how far a
//! failed task is pushed back in the schedule; [`RetryManager`] repeats a
//! short in-process operation (used for best-effort analytics fetches).
//! Both decide on the classified error kind, never on message text.

use crate::core::error::PublishError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Schedule backoff for requeued tasks
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Upper bound for any computed delay
    pub max_delay: Duration,
    /// Growth factor per retry
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5 * 60),
            max_delay: Duration::from_secs(60 * 60),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (1-based)
    ///
    /// A platform-advertised `retry_after` wins over the exponential
    /// schedule but is still capped.
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(advertised) = retry_after {
            return advertised.min(self.max_delay);
        }

        let exponent = retry.saturating_sub(1).min(32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Options for in-process retry behavior
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Retry manager for executing operations with exponential backoff
///
/// # Examples
///
/// ```no_run
/// use social_publisher::core::{RetryManager, RetryOptions, PublishError};
///
/// # async fn example() -> Result<(), PublishError> {
/// let manager = RetryManager::new(RetryOptions::default());
///
/// let value = manager
///     .retry(|| async { Ok::<_, PublishError>(42) })
///     .await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub struct RetryManager {
    options: RetryOptions,
}

impl RetryManager {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }

    /// Execute the given async operation with retry logic
    ///
    /// Only retryable error kinds are repeated; anything else returns
    /// immediately. A `retry_after` hint replaces the computed delay.
    pub async fn retry<F, Fut, T>(&self, mut operation: F) -> Result<T, PublishError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PublishError>>,
    {
        let mut delay = self.options.initial_delay;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !error.is_retryable() || attempt >= self.options.max_attempts {
                        return Err(error);
                    }

                    let wait = error
                        .retry_after()
                        .unwrap_or(delay)
                        .min(self.options.max_delay);
                    debug!(attempt, ?wait, error = %error, "retrying operation");
                    sleep(wait).await;

                    delay = Duration::from_secs_f64(
                        delay.as_secs_f64() * self.options.backoff_multiplier,
                    )
                    .min(self.options.max_delay);
                    attempt += 1;
                }
            }
        }
    }
}
