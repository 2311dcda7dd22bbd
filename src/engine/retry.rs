//! Bounded exponential-backoff retry policy
//!
//! Every remote call made by the engine runs under [`RetryPolicy::run`].

use crate::config::{Connection, DEFAULT_MAX_ERROR_RETRY_ATTEMPTS, DEFAULT_MIN_ERROR_RETRY_DELAY_MS};
use crate::error::RemoteError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Upper bound for a single backoff sleep
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ERROR_RETRY_ATTEMPTS,
            min_delay: Duration::from_millis(DEFAULT_MIN_ERROR_RETRY_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: MAX_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy from connection tuning, falling back to defaults
    pub fn from_connection(connection: &Connection) -> Self {
        let defaults = Self::default();
        Self {
            // zero attempts would never call the remote at all
            max_attempts: connection
                .max_error_retry_attempts
                .unwrap_or(defaults.max_attempts)
                .max(1),
            min_delay: connection
                .min_error_retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_delay),
            ..defaults
        }
    }

    /// Delay after the given failed attempt (1-based):
    /// `min_delay * multiplier^(attempt-1)`, capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let nanos = self.min_delay.as_nanos() as f64 * factor;
        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            self.max_delay
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` is used up. Cancellation abandons both the in-flight
    /// call and any pending backoff sleep.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 1;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
                result = call() => result,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after {}",
                        err
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        tracing::debug!(operation, attempt, "giving up: {}", err);
                    }
                    return Err(err);
                }
            }
        }
    }
}
