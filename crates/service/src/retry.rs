use std::time::Duration;

use configs::RetryConfig;
use tokio::time::sleep;
use tracing::debug;

use crate::storage::StoreError;

/// Bounded retry for conflicting list writes.
///
/// `max_attempts` counts write attempts, including the first one. Only
/// revision conflicts are retried; every other store failure is final.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::ZERO, Duration::ZERO)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration, backoff_max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
            backoff_max,
        }
    }

    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self::new(
            cfg.max_attempts,
            Duration::from_millis(cfg.backoff_base_ms),
            Duration::from_millis(cfg.backoff_max_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the `attempt`-th failure: exponential from `backoff_base`, capped at `backoff_max`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if self.backoff_base.is_zero() || attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2_u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
        let delay = self.backoff_base.saturating_mul(factor);
        let cap = self.backoff_max.max(self.backoff_base);
        delay.min(cap)
    }

    pub async fn wait_before_retry(&self, attempt: u32) {
        let delay = self.backoff_for(attempt);
        if delay.is_zero() {
            return;
        }
        debug!("Retrying in {:?} (attempt {})", delay, attempt);
        sleep(delay).await;
    }

    /// `attempt` is the number of attempts already made.
    pub fn should_retry(&self, attempt: u32, error: &StoreError) -> bool {
        if !error.is_conflict() {
            return false;
        }
        if attempt >= self.max_attempts {
            debug!("Max retry attempts ({}) reached", self.max_attempts);
            return false;
        }
        true
    }
}
