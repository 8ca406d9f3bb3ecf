//! Retry and time-limit policy consumed by the worker loop.

use std::time::Duration;

use crate::analysis::AnalysisError;
use crate::error::CoreError;

/// Total attempts per job: 1 original + 3 retries.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Fixed delay before a transiently failed job is redelivered.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Checked at stage boundaries; crossing it aborts the attempt cleanly.
pub const DEFAULT_SOFT_TIME_LIMIT: Duration = Duration::from_secs(270);

/// Absolute budget per attempt.
pub const DEFAULT_HARD_TIME_LIMIT: Duration = Duration::from_secs(300);

/// What the worker should do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Leave the message unacknowledged and redeliver after the delay.
    RetryAfter(Duration),
    /// Write `FAILED` and acknowledge.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub soft_time_limit: Duration,
    pub hard_time_limit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_RETRY_BACKOFF,
            soft_time_limit: DEFAULT_SOFT_TIME_LIMIT,
            hard_time_limit: DEFAULT_HARD_TIME_LIMIT,
        }
    }
}

impl RetryPolicy {
    /// Classify a failure on attempt `attempt` (1-based).
    pub fn decide(&self, error: &AnalysisError, attempt: u32) -> RetryDecision {
        if error.is_transient() && !self.attempts_exhausted(attempt) {
            RetryDecision::RetryAfter(self.backoff)
        } else {
            RetryDecision::Fail
        }
    }

    /// True once `attempt` has used up the budget.
    pub fn attempts_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_attempts == 0 {
            return Err(CoreError::Validation(
                "max_attempts must be at least 1".into(),
            ));
        }
        if self.soft_time_limit > self.hard_time_limit {
            return Err(CoreError::Validation(format!(
                "soft time limit ({}s) must not exceed hard time limit ({}s)",
                self.soft_time_limit.as_secs(),
                self.hard_time_limit.as_secs()
            )));
        }
        Ok(())
    }
}
