//! Retry policy for provider calls.

use std::time::Duration;

use crate::error::{Result, UpkeepError};

/// Exponential backoff applied around retry-eligible provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
    /// Upper bound for any single wait, including provider retry hints.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            factor: 2,
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits, for tests and dry runs.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            factor: 1,
            max_delay: Duration::ZERO,
        }
    }

    /// Validate the policy.
    ///
    /// # Errors
    /// Returns a config error for zero attempts or a zero factor.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(UpkeepError::ConfigInvalid {
                key: "sync.max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.factor == 0 {
            return Err(UpkeepError::ConfigInvalid {
                key: "sync.backoff_factor".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Backoff before retry number `retry` (1 for the wait after the first failure).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let multiplier = self.factor.saturating_pow(exponent);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }

    /// Wait before the next attempt, honoring a provider hint within the cap.
    #[must_use]
    pub fn delay_for(&self, retry: u32, error: &UpkeepError) -> Duration {
        let backoff = self.backoff(retry);
        error
            .retry_after()
            .map_or(backoff, |hint| hint.max(backoff).min(self.max_delay))
    }

    /// Whether another attempt is allowed after `attempts` tries failed with `error`.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32, error: &UpkeepError) -> bool {
        error.is_retryable() && attempts < self.max_attempts
    }
}
