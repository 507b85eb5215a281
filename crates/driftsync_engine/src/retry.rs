//! Retry and escalation policy.

use crate::config::{BackoffConfig, SyncConfig};
use std::time::Duration;

/// What to do with a mutation after an error outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep the mutation queued with the new retry count.
    Retry {
        /// Incremented retry count.
        retry_count: u32,
    },
    /// Move the mutation to the dead-letter store.
    Escalate {
        /// Incremented retry count, equal to the budget.
        retry_count: u32,
    },
}

impl RetryDecision {
    /// The retry count to persist.
    pub fn retry_count(&self) -> u32 {
        match self {
            RetryDecision::Retry { retry_count } | RetryDecision::Escalate { retry_count } => {
                *retry_count
            }
        }
    }
}

/// Decides between retrying and escalating failed mutations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: BackoffConfig,
}

impl RetryPolicy {
    /// Creates a policy with the default backoff.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: BackoffConfig::default(),
        }
    }

    /// Creates the policy described by `config`.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.backoff.clone(),
        }
    }

    /// The retry budget.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decides the fate of a mutation that failed with `retry_count`
    /// previous failures.
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        let next = retry_count.saturating_add(1);
        if next >= self.max_retries {
            RetryDecision::Escalate { retry_count: next }
        } else {
            RetryDecision::Retry { retry_count: next }
        }
    }

    /// Delay before the next pass after `failures` consecutive unsuccessful
    /// passes.
    pub fn delay_after_failures(&self, failures: u32) -> Duration {
        self.backoff.delay_for_attempt(failures)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
