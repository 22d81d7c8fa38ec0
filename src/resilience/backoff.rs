//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Retry schedule for an operation against an external system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait before attempt number `attempt` (1-based, the first attempt has none).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;

        let exponential = 2u64.saturating_pow(attempt - 2);
        let capped = base_ms.saturating_mul(exponential).min(max_ms);

        // Jitter of up to 10% spreads out retries that failed together.
        let jitter_range = capped / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped + jitter)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
        }
    }

    #[test]
    fn test_first_attempt_has_no_delay() {
        assert_eq!(policy(100, 2000).delay_before(1), Duration::ZERO);
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let p = policy(100, 1000);
        let second = p.delay_before(2).as_millis();
        let third = p.delay_before(3).as_millis();
        assert!((100..110).contains(&second));
        assert!((200..220).contains(&third));

        let capped = p.delay_before(12).as_millis();
        assert!((1000..1100).contains(&capped));
    }

    #[test]
    fn test_from_config_never_zero_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            base_delay_ms: 10,
            max_delay_ms: 20,
        };
        assert_eq!(RetryPolicy::from(&config).max_attempts, 1);
    }
}
