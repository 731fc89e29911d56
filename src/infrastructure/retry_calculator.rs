//! Exponential backoff with jitter
//!
//! Used for transient fetch failures and for spacing session restarts.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

/// Backoff schedule for one kind of retry.
#[derive(Debug, Clone)]
pub struct RetryCalculator {
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    backoff_multiplier: f64,
    enable_jitter: bool,
}

impl Default for RetryCalculator {
    fn default() -> Self {
        Self::new(3, 1000, 30000, 2.0, true)
    }
}

impl RetryCalculator {
    pub const fn new(
        max_retries: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
        backoff_multiplier: f64,
        enable_jitter: bool,
    ) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            backoff_multiplier,
            enable_jitter,
        }
    }

    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let exponential = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = exponential.min(self.max_delay_ms as f64);

        let millis = if self.enable_jitter {
            // 50%-150% of the capped delay
            capped * (0.5 + fastrand::f64())
        } else {
            capped
        };

        Duration::from_millis(millis as u64)
    }
}
