//! C3: per-provider minimum inter-call spacing, thread-safe.

use crate::config::Config;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Tracks the last call time per provider behind a single mutex, so the
/// read-check-update cycle in `wait` can never race between two callers
/// targeting the same provider.
pub struct RateLimiter {
    config: Config,
    last_call: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            last_call: Mutex::new(HashMap::new()),
        }
    }

    /// Sleeps just long enough that this call is at least `delay(provider)`
    /// after the previous one, then records the new last-call time.
    pub async fn wait(&self, provider: &str) {
        let delay = Duration::from_millis(self.config.rate_limit_delay_ms(provider));
        let sleep_for = {
            let mut last_call = self.last_call.lock().unwrap();
            let now = Instant::now();
            let sleep_for = match last_call.get(provider) {
                Some(previous) => {
                    let elapsed = now.duration_since(*previous);
                    delay.saturating_sub(elapsed)
                }
                None => Duration::ZERO,
            };
            // Record the instant the call will actually proceed so the next
            // waiter measures spacing from there, not from `now`.
            last_call.insert(provider.to_string(), now + sleep_for);
            sleep_for
        };
        if !sleep_for.is_zero() {
            tokio::time::sleep(sleep_for).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consecutive_calls_are_spaced_by_at_least_the_configured_delay() {
        let mut config = Config::default();
        config.rate_limit.default_delay_ms = 50;
        let limiter = RateLimiter::new(config);

        let t1 = Instant::now();
        limiter.wait("anthropic").await;
        limiter.wait("anthropic").await;
        let elapsed = t1.elapsed();
        assert!(elapsed >= Duration::from_millis(50), "elapsed={elapsed:?}");
    }

    #[tokio::test]
    async fn different_providers_do_not_share_spacing() {
        let mut config = Config::default();
        config.rate_limit.default_delay_ms = 200;
        let limiter = RateLimiter::new(config);

        let t1 = Instant::now();
        limiter.wait("anthropic").await;
        limiter.wait("openai").await;
        // Second call targets a different provider and should not wait the
        // full 200ms that `anthropic` would have imposed on itself.
        assert!(t1.elapsed() < Duration::from_millis(200));
    }
}
