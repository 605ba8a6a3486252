//! Exponential-backoff retry for transient store errors

use crate::error::{StoreError, StoreResult};
use std::time::Duration;
use tracing::warn;

/// Retry policy for transient store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given 1-based retry attempt: base × 2^(n−1), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails non-transiently, or exhausts the
/// policy's attempts. Only transient errors are retried.
pub fn run_with_retry<T, F>(policy: &RetryPolicy, what: &str, mut op: F) -> StoreResult<T>
where
    F: FnMut() -> StoreResult<T>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient store error; retrying"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_secs(1));
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let mut calls = 0;
        let result = run_with_retry(&fast_policy(), "write", || {
            calls += 1;
            if calls < 3 {
                Err(StoreError::Timeout("slow".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_non_transient_fails_immediately() {
        let mut calls = 0;
        let result: StoreResult<()> = run_with_retry(&fast_policy(), "write", || {
            calls += 1;
            Err(StoreError::NotFound("gone".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_attempts_exhausted() {
        let mut calls = 0;
        let result: StoreResult<()> = run_with_retry(&fast_policy(), "write", || {
            calls += 1;
            Err(StoreError::Connection("down".into()))
        });
        assert!(matches!(result, Err(StoreError::Connection(_))));
        assert_eq!(calls, 3);
    }
}
