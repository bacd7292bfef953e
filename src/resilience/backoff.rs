//! Exponential backoff with symmetric jitter.

use super::rate_limiter::RateLimitPolicy;
use rand::Rng;
use std::time::Duration;

/// Fraction of the capped delay added or removed at random.
pub const JITTER_RATIO: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn from_policy(policy: &RateLimitPolicy) -> Self {
        Self::new(policy.base_delay, policy.max_delay)
    }

    /// `min(base * 2^attempt, max)` before jitter, at full `Duration` precision.
    pub fn capped(&self, attempt: u32) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }
        1u32.checked_shl(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |d| d.min(self.max))
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let sample: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
        self.delay_with_sample(attempt, sample)
    }

    /// Deterministic variant of [`Backoff::delay`]; `sample` in `[-1, 1]` picks the jitter.
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let capped = self.capped(attempt);
        let secs = capped.as_secs_f64();
        let jitter = secs * JITTER_RATIO * sample.clamp(-1.0, 1.0);
        Duration::try_from_secs_f64((secs + jitter).max(0.0)).unwrap_or(capped)
    }
}
