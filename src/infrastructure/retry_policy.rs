//! Retry and pacing arithmetic for network calls.
//!
//! Exponential backoff with jitter for transient failures, plus the uniform
//! randomized waits used to pace requests against the target site.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use crate::domain::FailureKind;
use crate::infrastructure::config::FetchConfig;

/// Inclusive millisecond range a random wait is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    #[must_use]
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    /// Uniform draw; a reversed range is treated as its mirror.
    #[must_use]
    pub fn sample(&self) -> Duration {
        let (lo, hi) = if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        };
        Duration::from_millis(fastrand::u64(lo..=hi))
    }
}

/// Backoff calculator
#[derive(Debug, Clone)]
pub struct RetryCalculator {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    backoff_multiplier: f64,
    enable_jitter: bool,
}

impl RetryCalculator {
    #[must_use]
    pub const fn new(
        max_attempts: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
        backoff_multiplier: f64,
        enable_jitter: bool,
    ) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            backoff_multiplier,
            enable_jitter,
        }
    }

    #[must_use]
    pub fn from_fetch_config(config: &FetchConfig) -> Self {
        Self::new(config.max_attempts.max(1), config.backoff_base_ms, config.backoff_max_ms, 2.0, true)
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed
    /// with a failure of class `kind`.
    #[must_use]
    pub fn should_retry(&self, kind: FailureKind, attempt: u32) -> bool {
        attempt < self.max_attempts && kind != FailureKind::Permanent
    }

    /// Exponential backoff for a 1-based attempt number
    #[must_use]
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let exponential_delay = (self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent)) as u64;
        let capped_delay = exponential_delay.min(self.max_delay_ms);

        if self.enable_jitter {
            // 50%-150% jitter
            let jitter_factor = 0.5 + fastrand::f64();
            Duration::from_millis((capped_delay as f64 * jitter_factor) as u64)
        } else {
            Duration::from_millis(capped_delay)
        }
    }
}

impl Default for RetryCalculator {
    fn default() -> Self {
        Self::new(3, 1000, 30_000, 2.0, true)
    }
}
