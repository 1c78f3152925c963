//! Retry policy for the connection handshake
//!
//! Exponential backoff without jitter: the orchestrator needs a deterministic
//! delay sequence so reconnection behavior is reproducible and testable.

use std::time::Duration;

/// Retry policy for handshake attempts
///
/// Pure value; the delay sequence is fully determined by the attempt index:
/// `delay(n) = min(initial_delay * multiplier^n, max_delay)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first failed attempt (0 disables retries)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any retry delay
    pub max_delay: Duration,
    /// Backoff multiplier applied per attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(2000),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Calculate the delay before retry `attempt` (0-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        let initial_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = initial_ms * self.backoff_multiplier.powi(attempt as i32);
        let delay_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms as u64)
    }

    /// Check if another retry is allowed after `attempt` failures
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(1000));
        assert_eq!(policy.max_delay, Duration::from_millis(2000));
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        };

        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_clamped_to_max() {
        let policy = RetryPolicy::default();

        // 1000ms, then clamped at 2000ms from the second retry on
        assert_eq!(policy.delay(0), Duration::from_millis(1000));
        assert_eq!(policy.delay(1), Duration::from_millis(2000));
        assert_eq!(policy.delay(2), Duration::from_millis(2000));
        assert_eq!(policy.delay(10), Duration::from_millis(2000));
    }

    #[test]
    fn test_delay_never_exceeds_max() {
        let policy = RetryPolicy {
            max_retries: 32,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_millis(5000),
            backoff_multiplier: 3.0,
        };

        for attempt in 0..policy.max_retries {
            assert!(policy.delay(attempt) <= policy.max_delay);
        }
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy {
            max_retries: 3,
            ..Default::default()
        };

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(10));
    }

    #[test]
    fn test_zero_retries_disables() {
        let policy = RetryPolicy {
            max_retries: 0,
            ..Default::default()
        };
        assert!(!policy.should_retry(0));
    }
}
