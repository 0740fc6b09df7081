//! Bounded exponential backoff shared by the scanner and the loader.

use std::time::Duration;

/// Backoff parameters: `base * multiplier^(attempt-1)`, capped at `max_delay`,
/// with up to `jitter` of the delay randomly removed.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Fraction of the delay subject to jitter, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            max_attempts: 8,
            jitter: 0.5,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately, for tests and local runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
            max_attempts,
            jitter: 0.0,
        }
    }

    /// Whether another attempt is allowed after `attempt` attempts failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based). `sample` is a uniform random number in `[0, 1)`.
    pub fn delay(&self, attempt: u32, sample: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());

        let jitter = self.jitter.clamp(0.0, 1.0);
        let sample = sample.clamp(0.0, 1.0);
        let secs = capped * (1.0 - jitter * sample);

        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = no_jitter();
        assert_eq!(policy.delay(1, 0.0), Duration::from_millis(100));
        assert_eq!(policy.delay(2, 0.0), Duration::from_millis(200));
        assert_eq!(policy.delay(4, 0.0), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = no_jitter();
        assert_eq!(policy.delay(30, 0.0), Duration::from_secs(10));
        assert_eq!(policy.delay(u32::MAX, 0.0), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_reduces_delay_within_bounds() {
        let policy = RetryPolicy::default();
        let full = policy.delay(3, 0.0);
        let jittered = policy.delay(3, 0.999);
        assert_eq!(full, Duration::from_millis(400));
        assert!(jittered < full);
        assert!(jittered >= Duration::from_millis(200));
    }

    #[test]
    fn test_should_retry_respects_cap() {
        let policy = RetryPolicy::immediate(3);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(policy.delay(2, 0.5), Duration::ZERO);
    }
}
