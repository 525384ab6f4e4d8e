//! Reconnect backoff.
//!
//! The delay before reconnect attempt `n` (1-based) is
//! `min(base * multiplier^(n-1), max)`. No jitter is applied, so the
//! schedule is exact and reproducible.

use std::time::Duration;

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// Default delay before the first reconnect attempt.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default cap on the reconnect delay.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default growth factor between attempts.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Reconnect schedule parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before attempt 1.
    pub base: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Upper bound on any delay.
    pub max: Duration,
    /// Attempts allowed before the schedule is exhausted.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            multiplier: DEFAULT_MULTIPLIER,
            max: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    /// Delay before attempt `attempt` (1-based; 0 is treated as 1).
    #[allow(clippy::cast_possible_truncation)]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(reconnect_delay_ms(
            attempt,
            self.base.as_millis() as u64,
            self.multiplier,
            self.max.as_millis() as u64,
        ))
    }

    /// Whether attempt `attempt` is still within budget.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

/// `min(base_ms * multiplier^(attempt-1), max_ms)` in whole milliseconds.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn reconnect_delay_ms(attempt: u32, base_ms: u64, multiplier: f64, max_ms: u64) -> u64 {
    let exponent = attempt.max(1) - 1;
    let factor = multiplier.max(1.0).powi(exponent.min(i32::MAX as u32) as i32);
    let raw = base_ms as f64 * factor;
    if !raw.is_finite() || raw >= max_ms as f64 {
        max_ms
    } else {
        raw.round() as u64
    }
}
