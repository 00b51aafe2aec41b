//! Retry budget and backoff for failed dispatches.

use std::time::Duration;

use rand::Rng;

/// Exponent cap so the delay stops doubling after a handful of attempts.
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Fraction of the computed delay added as random jitter.
const JITTER_FRACTION: f64 = 0.2;

/// Decides whether a failed operation gets another attempt and how long to
/// wait before it.
///
/// The attempt counter counts failures, not tries: an operation that has
/// failed `max_retries` times is out of budget. The counter is seeded from
/// the persisted retry count of the underlying rows, so attempts survive a
/// process restart.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns whether an operation with this many recorded failures has no
    /// retries left.
    pub fn is_exhausted(&self, failed_attempts: u32) -> bool {
        failed_attempts >= self.max_retries
    }

    /// Exponential delay with jitter for the given failure count.
    ///
    /// Jitter spreads out retries when several nodes hit the same failing
    /// backend at once.
    pub fn backoff_delay(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.min(MAX_BACKOFF_EXPONENT);
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(exponent));
        let jitter = delay.mul_f64(rand::thread_rng().gen_range(0.0..JITTER_FRACTION));

        delay.saturating_add(jitter)
    }
}
