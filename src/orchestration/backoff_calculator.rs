//! # Backoff Calculator
//!
//! Computes the delay before a failed task becomes eligible again.
//!
//! For the `n`-th retry (`n >= 1`):
//!
//! ```text
//! raw    = retry_delay_base * multiplier^(n-1)
//! delay  = min(raw + jitter, retry_delay_max)      jitter in [0, max_jitter * raw)
//! ```
//!
//! The multiplier must be at least `1 + max_jitter`, which keeps delays non-decreasing in
//! `n` even when one retry draws no jitter and the previous one drew the maximum.

use crate::error::{Result, SchedulerError};
use crate::models::TypePolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for backoff calculation behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffCalculatorConfig {
    /// Exponential multiplier (default: 2.0)
    pub multiplier: f64,
    /// Whether to add jitter to prevent thundering herd
    pub jitter_enabled: bool,
    /// Maximum jitter as a fraction of the raw delay (0.0 to 1.0)
    pub max_jitter: f64,
}

impl Default for BackoffCalculatorConfig {
    fn default() -> Self {
        Self {
            multiplier: 2.0,
            jitter_enabled: true,
            max_jitter: crate::constants::system::MAX_JITTER_RATIO,
        }
    }
}

impl BackoffCalculatorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.max_jitter) {
            return Err(SchedulerError::ConfigurationError(format!(
                "max_jitter must be within [0, 1], got {}",
                self.max_jitter
            )));
        }
        let min_multiplier = 1.0 + if self.jitter_enabled { self.max_jitter } else { 0.0 };
        if !self.multiplier.is_finite() || self.multiplier < min_multiplier {
            return Err(SchedulerError::ConfigurationError(format!(
                "multiplier must be at least {min_multiplier}, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffResult {
    pub retry_count: u32,
    pub delay: Duration,
    /// Delay before jitter and cap
    pub raw_delay: Duration,
    pub capped: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BackoffCalculator {
    config: BackoffCalculatorConfig,
}

impl BackoffCalculator {
    pub fn new(config: BackoffCalculatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Deterministic calculator for tests and diagnostics.
    pub fn without_jitter() -> Self {
        Self {
            config: BackoffCalculatorConfig {
                jitter_enabled: false,
                ..BackoffCalculatorConfig::default()
            },
        }
    }

    pub fn config(&self) -> &BackoffCalculatorConfig {
        &self.config
    }

    /// `retry_delay_base * multiplier^(retry_count-1)`, capped at `retry_delay_max`.
    pub fn base_delay_for(&self, retry_count: u32, policy: &TypePolicy) -> Duration {
        self.raw_delay(retry_count, policy).min(policy.retry_delay_max)
    }

    /// Delay to apply before the `retry_count`-th retry.
    pub fn delay_for(&self, retry_count: u32, policy: &TypePolicy) -> BackoffResult {
        let raw_delay = self.raw_delay(retry_count, policy);
        let jitter = if self.config.jitter_enabled && self.config.max_jitter > 0.0 {
            raw_delay.mul_f64(fastrand::f64() * self.config.max_jitter)
        } else {
            Duration::ZERO
        };
        let uncapped = raw_delay.saturating_add(jitter);
        let capped = uncapped > policy.retry_delay_max;

        BackoffResult {
            retry_count,
            delay: uncapped.min(policy.retry_delay_max),
            raw_delay,
            capped,
        }
    }

    fn raw_delay(&self, retry_count: u32, policy: &TypePolicy) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.config.multiplier.powi(exponent);
        let nanos = policy.retry_delay_base.as_nanos() as f64 * factor;
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return Duration::MAX;
        }
        Duration::from_nanos(nanos as u64)
    }
}
