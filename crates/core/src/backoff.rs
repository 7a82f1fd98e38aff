//! Exponential backoff shared by every retry loop in the pipeline.
//!
//! Frame fetches, job submissions that fail at the transport level, and
//! job-status polls that fail transiently all wait according to the same
//! [`BackoffPolicy`]. The policy is deterministic: no jitter and no cap.
//! Callers bound the number of attempts, not the delay.

use std::time::Duration;

/// Reference base delay between the first and second attempt.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);

/// `base * 2^(attempt - 1)` with 1-indexed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    /// Base delay (the wait after attempt 1).
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Delay to wait after the given failed attempt.
    ///
    /// Attempt `0` is treated like attempt `1`. The exponent saturates so
    /// absurd attempt numbers cannot overflow the shift.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exponent)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE)
    }
}
