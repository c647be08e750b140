//! Retry policy for transient remote failures.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with full jitter.
///
/// An explicit policy object rather than inline loops, so limits and
/// delays are independently testable and tunable per deployment.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay ceiling grows from here: `base * 2^attempt`
    pub base_delay: Duration,
    /// Hard cap on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), drawn uniformly
    /// from `[0, min(max_delay, base_delay * 2^attempt)]`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling_for(attempt);
        if ceiling.is_zero() {
            return ceiling;
        }
        let millis = rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64);
        Duration::from_millis(millis)
    }

    /// Upper bound of the jitter window for an attempt.
    #[must_use]
    pub fn ceiling_for(&self, attempt: u32) -> Duration {
        // Shift saturates well before u32::MAX attempts can overflow.
        let factor = 1u64 << attempt.min(20);
        let ceiling_ms = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(ceiling_ms).min(self.max_delay)
    }

    /// Whether another retry is allowed after `attempt` failures.
    #[must_use]
    pub const fn allows_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts.saturating_sub(1)
    }
}
