//! C4 (retry half): wraps a fallible async operation with bounded retries
//! and a configurable backoff policy.
//!
//! Grounded on the teacher's `llm/anthropic.rs::retry_with_backoff`, which
//! inlined a single exponential-backoff loop around one provider's client.
//! This generalizes that loop into a reusable policy object so every
//! provider, and the segment/context summarizers, share one implementation.

use crate::config::RetryConfig;
use crate::error::BookGeneratorError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    Exponential,
    Linear,
    Fixed,
}

impl BackoffStrategy {
    /// `attempt` is 1-indexed: the delay *before* the nth retry.
    pub fn delay(&self, base: Duration, max: Duration, attempt: u32) -> Duration {
        let raw = match self {
            BackoffStrategy::Exponential => base.mul_f64(2f64.powi(attempt as i32 - 1)),
            BackoffStrategy::Linear => base.mul_f64(attempt as f64),
            BackoffStrategy::Fixed => base,
        };
        raw.min(max)
    }
}

/// Runs `operation` up to `config.max_attempts + 1` times total, retrying
/// only errors `BookGeneratorError::is_retryable()` reports as transient.
/// Fatal errors and the final retryable failure propagate unchanged.
pub async fn retry<F, Fut, T>(config: &RetryConfig, mut operation: F) -> Result<T, BookGeneratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BookGeneratorError>>,
{
    let base = Duration::from_millis(config.base_delay_ms);
    let max = Duration::from_millis(config.max_delay_ms);
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && (attempt as usize) < config.max_attempts => {
                attempt += 1;
                let delay = config.backoff_strategy.delay(base, max, attempt);
                warn!(attempt, ?delay, error = %err, "retrying after transient error");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
