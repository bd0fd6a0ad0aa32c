//! Reconnect limits and backoff schedule.

use std::time::Duration;

/// Reconnect attempts per server before the entry stays in error.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Exponential backoff: `base × 2^(attempt−1)`, capped.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given 1-based attempt. Attempt 0 maps to zero delay.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 2u64.saturating_pow(exponent);
        let delay_ms = (self.base.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.cap.as_millis() as u64))
    }
}
