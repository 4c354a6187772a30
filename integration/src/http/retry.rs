//! Retry policy: capped exponential backoff with optional jitter.

use rand::Rng;
use std::time::Duration;

/// HTTP statuses the pipeline retries.
pub const RETRYABLE_STATUS: [u16; 6] = [408, 429, 500, 502, 503, 504];

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUS.contains(&status)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Base delay before retrying after `attempt` (0-indexed):
    /// `min(initial_delay * multiplier^attempt, max_delay)`.
    ///
    /// Monotonically non-decreasing in `attempt`, up to `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// Base delay with +/-10% jitter applied when enabled.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.delay(attempt);
        if !self.jitter {
            return base;
        }
        let spread = rand::rng().random_range(0.9..=1.1);
        Duration::from_secs_f64(base.as_secs_f64() * spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_are_non_decreasing_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 8,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(1_000),
            jitter: false,
        };
        let delays: Vec<_> = (0..8).map(|attempt| policy.delay(attempt)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[7], Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter: true,
            initial_delay: Duration::from_millis(100),
            multiplier: 1.0,
            ..RetryPolicy::default()
        };
        for _ in 0..100 {
            let jittered = policy.jittered_delay(0);
            assert!(jittered >= Duration::from_millis(90));
            assert!(jittered <= Duration::from_millis(110));
        }
    }

    #[test]
    fn test_retryable_statuses() {
        for status in RETRYABLE_STATUS {
            assert!(is_retryable_status(status));
        }
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
        assert!(!is_retryable_status(200));
    }
}
