//! Bounded retry with exponential backoff, and the cancellation token checked
//! between attempts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` means a single attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time.
    pub cooldown: Duration,
    /// Ceiling for a single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            cooldown: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry `n` (0-based): `cooldown * 2^n`, capped at `max_backoff`.
    pub fn delay_for(&self, n: u32) -> Duration {
        let factor = 1u32.checked_shl(n).unwrap_or(u32::MAX);
        self.cooldown.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `d` in short slices, returning early (`false`) once cancelled.
    pub fn sleep(&self, d: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(50);
        let mut left = d;
        while !left.is_zero() {
            if self.is_cancelled() {
                return false;
            }
            let step = left.min(SLICE);
            std::thread::sleep(step);
            left -= step;
        }
        !self.is_cancelled()
    }
}
