//! Exponential backoff with full jitter
//!
//! Each failed attempt doubles the delay ceiling up to a cap; the actual
//! delay is drawn uniformly from zero to the ceiling so concurrent
//! retriers spread out instead of stampeding together. Reset on success.

use std::time::Duration;

/// Retry delay generator
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    /// Forgets accumulated failures; the next delay starts from base again
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Delay to sleep before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.ceiling();
        self.attempt = self.attempt.saturating_add(1);

        let millis = ceiling.as_millis() as u64;
        if millis == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::random::<u64>() % (millis + 1))
    }

    /// Current delay ceiling: base * 2^attempt, capped
    fn ceiling(&self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_stay_within_the_growing_ceiling() {
        let mut backoff =
            Backoff::new(Duration::from_secs(5), Duration::from_secs(300));

        assert!(backoff.next_delay() <= Duration::from_secs(5));
        assert!(backoff.next_delay() <= Duration::from_secs(10));
        assert!(backoff.next_delay() <= Duration::from_secs(20));
        assert!(backoff.next_delay() <= Duration::from_secs(40));
    }

    #[test]
    fn test_ceiling_caps_and_never_overflows() {
        let mut backoff =
            Backoff::new(Duration::from_secs(5), Duration::from_secs(300));

        for _ in 0..200 {
            assert!(backoff.next_delay() <= Duration::from_secs(300));
        }
        assert_eq!(backoff.ceiling(), Duration::from_secs(300));
    }

    #[test]
    fn test_reset_returns_to_base() {
        let mut backoff =
            Backoff::new(Duration::from_secs(5), Duration::from_secs(300));
        for _ in 0..8 {
            backoff.next_delay();
        }

        backoff.reset();
        assert_eq!(backoff.ceiling(), Duration::from_secs(5));
        assert!(backoff.next_delay() <= Duration::from_secs(5));
    }
}
