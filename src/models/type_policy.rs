//! # Type Policy
//!
//! Per-task-type execution policy: how many tasks of the type may run at once, how long a
//! single handler invocation may take, and how failures are retried.

use crate::constants::policy_defaults;
use crate::error::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypePolicy {
    /// Maximum number of simultaneously running tasks of this type (>= 1)
    pub concurrency: usize,
    /// Upper bound on a single handler invocation
    #[serde(with = "crate::utils::serde::duration_ms")]
    pub timeout: Duration,
    /// Retries granted after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each subsequent retry
    #[serde(with = "crate::utils::serde::duration_ms")]
    pub retry_delay_base: Duration,
    /// Cap on any single retry delay
    #[serde(with = "crate::utils::serde::duration_ms")]
    pub retry_delay_max: Duration,
}

impl Default for TypePolicy {
    fn default() -> Self {
        Self {
            concurrency: policy_defaults::CONCURRENCY,
            timeout: Duration::from_millis(policy_defaults::TIMEOUT_MS),
            max_retries: policy_defaults::MAX_RETRIES,
            retry_delay_base: Duration::from_millis(policy_defaults::RETRY_DELAY_BASE_MS),
            retry_delay_max: Duration::from_millis(policy_defaults::RETRY_DELAY_MAX_MS),
        }
    }
}

impl TypePolicy {
    pub fn new(concurrency: usize, timeout: Duration, max_retries: u32) -> Self {
        Self {
            concurrency,
            timeout,
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_delay_base = base;
        self.retry_delay_max = max;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency < 1 {
            return Err(SchedulerError::ValidationError(format!(
                "concurrency must be at least 1, got {}",
                self.concurrency
            )));
        }
        if self.timeout.is_zero() {
            return Err(SchedulerError::ValidationError(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.retry_delay_base > self.retry_delay_max {
            return Err(SchedulerError::ValidationError(format!(
                "retry_delay_base ({:?}) must not exceed retry_delay_max ({:?})",
                self.retry_delay_base, self.retry_delay_max
            )));
        }
        Ok(())
    }

    /// Merge a partial update into a copy of this policy. The result is not validated.
    pub fn merged(&self, update: &TypePolicyUpdate) -> Self {
        Self {
            concurrency: update.concurrency.unwrap_or(self.concurrency),
            timeout: update.timeout.unwrap_or(self.timeout),
            max_retries: update.max_retries.unwrap_or(self.max_retries),
            retry_delay_base: update.retry_delay_base.unwrap_or(self.retry_delay_base),
            retry_delay_max: update.retry_delay_max.unwrap_or(self.retry_delay_max),
        }
    }
}

/// Partial policy; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypePolicyUpdate {
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default, with = "crate::utils::serde::option_duration_ms")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default, with = "crate::utils::serde::option_duration_ms")]
    pub retry_delay_base: Option<Duration>,
    #[serde(default, with = "crate::utils::serde::option_duration_ms")]
    pub retry_delay_max: Option<Duration>,
}

impl TypePolicyUpdate {
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_delay_base = Some(base);
        self.retry_delay_max = Some(max);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
