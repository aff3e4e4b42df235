//! Retry policy with exponential backoff for failed crawl tasks
//!
//! Every [`TaskError`] is classified as [`FailureClass::Transient`] or
//! [`FailureClass::Permanent`]. Transient failures are retried with a capped,
//! jittered exponential delay until the attempt budget is spent.

use crate::config::RetryConfig;
use crate::TaskError;
use rand::Rng;
use std::time::Duration;

/// Whether a failure may go away on retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network failures, timeouts, HTTP 5xx and 429, unavailable stores
    Transient,

    /// Other HTTP 4xx, schema mismatches, expired sessions
    Permanent,
}

/// Classifies a task error
///
/// # Examples
///
/// ```
/// use kongfz_crawler::crawler::{classify, FailureClass};
/// use kongfz_crawler::TaskError;
///
/// let err = TaskError::HttpStatus { url: "https://example.com".into(), code: 503 };
/// assert_eq!(classify(&err), FailureClass::Transient);
///
/// let err = TaskError::HttpStatus { url: "https://example.com".into(), code: 404 };
/// assert_eq!(classify(&err), FailureClass::Permanent);
/// ```
pub fn classify(error: &TaskError) -> FailureClass {
    match error {
        TaskError::Network { .. } | TaskError::Timeout { .. } | TaskError::StoreUnavailable(_) => {
            FailureClass::Transient
        }
        TaskError::HttpStatus { code, .. } if *code == 429 || (500..600).contains(code) => {
            FailureClass::Transient
        }
        TaskError::HttpStatus { .. } | TaskError::Schema { .. } | TaskError::AuthExpired { .. } => {
            FailureClass::Permanent
        }
    }
}

/// What to do with a failed task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue the task as retry number `attempt` after `delay`
    Retry { delay: Duration, attempt: u32 },

    /// Give the task up
    Abandon { reason: String },
}

/// Bounded exponential backoff
///
/// `attempt` counts retries: the first retry of a task is attempt 1. A task is
/// fetched at most `max_attempts + 1` times.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay),
            Duration::from_millis(config.max_delay),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether retry number `attempt` is still within budget
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Backoff before retry number `attempt`, without jitter
    ///
    /// `base × 2^(attempt−1)`, capped at the configured maximum.
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        2u32.checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Backoff before retry number `attempt`, with equal jitter
    ///
    /// Half of the capped delay is kept and a random amount up to the other half is
    /// added, so the result lies in `[capped / 2, capped]`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let capped = self.capped_delay(attempt);
        let half = capped / 2;
        let spread = (capped - half).as_millis() as u64;
        let jitter = if spread == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=spread)
        };
        half + Duration::from_millis(jitter)
    }

    /// Decides what happens to a task whose attempt number `attempt` just failed
    pub fn decide(&self, error: &TaskError, attempt: u32) -> RetryDecision {
        if classify(error) == FailureClass::Permanent {
            return RetryDecision::Abandon {
                reason: format!("permanent failure: {}", error),
            };
        }

        let next = attempt + 1;
        if !self.should_retry(next) {
            return RetryDecision::Abandon {
                reason: format!(
                    "retries exhausted after {} attempt(s): {}",
                    self.max_attempts, error
                ),
            };
        }

        let delay = self.next_delay(next);
        tracing::debug!(attempt = next, delay_ms = delay.as_millis() as u64, "Scheduling retry");
        RetryDecision::Retry {
            delay,
            attempt: next,
        }
    }
}
