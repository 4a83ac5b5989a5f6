//! Bounded exponential-backoff retry policy.
//!
//! Used identically by every tier pass and by outbound HTTP calls to
//! third-party APIs. No jitter is applied; under many concurrent jobs
//! retrying against the same API this can synchronize load (known gap).

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;
use crate::error::Result;

/// Wraps an async operation with bounded exponential-backoff retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    exponential_base: f64,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            exponential_base: config.exponential_base,
        }
    }

    /// Override the attempt bound (e.g. `max_retries_per_tier`).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Configured attempt bound.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry attempt `n` (n >= 1, after the first failure):
    /// `min(base_delay_ms * exponential_base^(n-1), max_delay_ms)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.exponential_base.powi(attempt.saturating_sub(1) as i32);
        let ms = (self.base_delay_ms as f64 * exp).min(self.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }

    /// Run `op`, retrying up to `max_retries` additional times on failure.
    /// The last error is surfaced to the caller; intermediate failures are
    /// logged and slept through.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(err);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        %label,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
