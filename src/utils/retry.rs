//! Exponential backoff for transient remote failures.
//!
//! [`with_retry`] re-runs an async operation until it succeeds or
//! `max_retries` retries have been spent. The delay grows by `multiplier`
//! per attempt, is randomized by `randomization_factor` in both directions,
//! and is capped at `max_interval`.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::errors::Result;

/// Backoff schedule for retried operations
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub randomization_factor: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
            multiplier: 1.5,
            randomization_factor: 0.5,
        }
    }
}

impl ExponentialBackoff {
    /// Schedule with the given retry budget and interval bounds
    pub fn new(max_retries: u32, initial_interval: Duration, max_interval: Duration) -> Self {
        Self { max_retries, initial_interval, max_interval, ..Default::default() }
    }

    /// Un-randomized delay before retry number `retry` (zero-based)
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(64) as i32);
        let millis = self.initial_interval.as_millis() as f64 * factor;
        let capped = millis.min(self.max_interval.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Delay before retry number `retry`, randomized into
    /// `[base * (1 - factor), base * (1 + factor)]` and capped.
    pub fn delay<R: Rng + ?Sized>(&self, retry: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(retry).as_millis() as f64;
        let delta = base * self.randomization_factor.clamp(0.0, 1.0);
        let randomized =
            if delta > 0.0 { rng.gen_range((base - delta)..=(base + delta)) } else { base };
        let capped = randomized.min(self.max_interval.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

/// Run `operation` until it succeeds or the retry budget is spent.
///
/// Every error is treated as transient. On exhaustion the last error is
/// returned unchanged so the caller can wrap it.
pub async fn with_retry<F, Fut, T>(
    backoff: &ExponentialBackoff,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if retry > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt = retry + 1,
                        "operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) if retry < backoff.max_retries => {
                let delay = backoff.delay(retry, &mut rand::thread_rng());
                tracing::warn!(
                    operation = operation_name,
                    attempt = retry + 1,
                    max_attempts = backoff.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(err) => {
                tracing::warn!(
                    operation = operation_name,
                    attempts = retry + 1,
                    error = %err,
                    "operation failed after all retries"
                );
                return Err(err);
            }
        }
    }
}
