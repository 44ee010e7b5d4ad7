//! Retry bounds for one logical request.

use crate::classify::Classification;
use crate::config::duration_str;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Wall-clock budget per request, from its first attempt.
    #[serde(with = "duration_str")]
    pub max_elapsed: Duration,
    /// Pause before each transient retry.
    #[serde(with = "duration_str")]
    pub retry_delay: Duration,
    /// Deadline of a single broadcast.
    #[serde(with = "duration_str")]
    pub attempt_timeout: Duration,
    /// Sequence corrections (and resubmissions) allowed per request.
    pub max_corrections: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            max_elapsed: Duration::from_secs(10),
            retry_delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(2),
            max_corrections: 1,
        }
    }
}

/// Decides whether a failed attempt may be followed by another.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether another attempt may follow.
    ///
    /// `attempts` is the number of broadcasts made so far (the failed one
    /// included) and `elapsed` the time since the first of them. A transient
    /// retry needs budget left once `retry_delay` has passed; a mismatch
    /// resubmission goes out immediately and only needs budget left. Duplicate
    /// and permanent failures are never retried.
    pub fn should_retry(
        &self,
        attempts: u32,
        elapsed: Duration,
        classification: &Classification,
    ) -> bool {
        if attempts > self.config.max_retries {
            return false;
        }
        match classification {
            Classification::Transient => {
                elapsed.saturating_add(self.config.retry_delay) < self.config.max_elapsed
            }
            Classification::SequenceMismatch { .. } => elapsed < self.config.max_elapsed,
            Classification::DuplicateSubmission | Classification::Permanent => false,
        }
    }

    /// Whether a request that has already been corrected `corrections` times
    /// may be corrected again.
    pub fn allows_correction(&self, corrections: u32) -> bool {
        corrections < self.config.max_corrections
    }

    /// Pause before the next attempt.
    pub fn delay_for(&self, classification: &Classification) -> Duration {
        match classification {
            Classification::Transient => self.config.retry_delay,
            _ => Duration::ZERO,
        }
    }

    /// Deadline for an attempt starting `elapsed` into the request:
    /// `attempt_timeout`, capped by what is left of the budget.
    ///
    /// Returns `None` once the budget is spent.
    pub fn attempt_deadline(&self, elapsed: Duration) -> Option<Duration> {
        let remaining = self.config.max_elapsed.checked_sub(elapsed)?;
        if remaining.is_zero() {
            return None;
        }
        Some(self.config.attempt_timeout.min(remaining))
    }
}
