//! Retry policy: decides backoff delays.

use std::time::Duration;

use rand::Rng;

use crate::error::EngineError;

/// Exponential backoff policy for failed tasks.
///
/// The delay before re-dispatching a task that has failed `attempts` times is
/// `min(max_delay, base_delay * multiplier^(attempts - 1))`, optionally
/// spread by a jitter fraction.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,

    /// Backoff multiplier applied per additional failure.
    pub multiplier: f64,

    /// Upper bound on the computed delay.
    pub max_delay: Duration,

    /// Jitter fraction in `[0.0, 1.0)`. A value of `0.1` spreads each delay
    /// uniformly within ±10%. Zero keeps backoff exact.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, given the number of attempts already
    /// made (1-indexed: `attempts == 1` after the first failure).
    ///
    /// Example with base=2s, multiplier=2.0, cap=60s:
    /// - after attempt 1: 2s
    /// - after attempt 2: 4s
    /// - after attempt 3: 8s
    /// - after attempt 6: 60s (capped)
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());

        let spread = if self.jitter > 0.0 {
            let factor = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            capped * (1.0 + factor)
        } else {
            capped
        };

        Duration::from_secs_f64(spread.max(0.0))
    }

    /// Fail-fast validation, used at task creation and engine construction.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.base_delay.is_zero() {
            return Err(EngineError::InvalidConfiguration(
                "retry base_delay must be non-zero".to_string(),
            ));
        }
        if self.multiplier < 1.0 {
            return Err(EngineError::InvalidConfiguration(format!(
                "retry multiplier must be >= 1.0 (got {})",
                self.multiplier
            )));
        }
        if self.max_delay < self.base_delay {
            return Err(EngineError::InvalidConfiguration(
                "retry max_delay must be >= base_delay".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(EngineError::InvalidConfiguration(format!(
                "retry jitter must be in [0.0, 1.0) (got {})",
                self.jitter
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        let policy = RetryPolicy::default();
        policy.validate().unwrap();
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.multiplier, 2.0);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.next_delay(1), Duration::from_secs(2));
        assert_eq!(policy.next_delay(2), Duration::from_secs(4));
        assert_eq!(policy.next_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: 0.0,
        };

        assert_eq!(policy.next_delay(3), Duration::from_secs(8));
        assert_eq!(policy.next_delay(4), Duration::from_secs(10));
        assert_eq!(policy.next_delay(30), Duration::from_secs(10));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            jitter: 0.2,
        };

        for _ in 0..100 {
            let d = policy.next_delay(1).as_secs_f64();
            assert!((8.0..=12.0).contains(&d), "delay out of bounds: {d}");
        }
    }

    #[test]
    fn validate_rejects_bad_values() {
        let zero_base = RetryPolicy {
            base_delay: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert!(zero_base.validate().is_err());

        let shrinking = RetryPolicy {
            multiplier: 0.5,
            ..RetryPolicy::default()
        };
        assert!(shrinking.validate().is_err());

        let wild_jitter = RetryPolicy {
            jitter: 1.5,
            ..RetryPolicy::default()
        };
        assert!(wild_jitter.validate().is_err());
    }
}
