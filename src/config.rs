//! # Scheduler Configuration
//!
//! Settings are layered with the `config` crate, later layers overriding earlier ones:
//!
//! 1. built-in defaults ([`SchedulerConfig::default`])
//! 2. an optional TOML file
//! 3. environment variables prefixed `TASKER_SCHEDULER__`, nested with `__`
//!    (for example `TASKER_SCHEDULER__TICK_INTERVAL_MS=250` or
//!    `TASKER_SCHEDULER__TYPES__EMAIL__CONCURRENCY=4`)
//!
//! ```toml
//! tick_interval_ms = 250
//! history_limit = 500
//!
//! [default_policy]
//! timeout_ms = 10000
//!
//! [types.email]
//! concurrency = 2
//! max_retries = 5
//! ```
//!
//! Per-type entries only need the fields they change; everything else falls back to
//! `default_policy` and then to the built-in policy defaults.

use crate::constants::system;
use crate::error::{Result, SchedulerError};
use crate::models::TypePolicy;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const ENV_PREFIX: &str = "TASKER_SCHEDULER";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
    /// Finished tasks kept for `get_task_history`
    pub history_limit: usize,
    /// Sliding window used for throughput
    pub metrics_window_secs: u64,
    pub shutdown_grace_ms: u64,
    /// Add up to 10% random jitter to retry delays
    pub retry_jitter: bool,
    pub default_policy: TypePolicyConfig,
    pub types: HashMap<String, TypePolicyConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: system::DEFAULT_TICK_INTERVAL_MS,
            history_limit: system::DEFAULT_HISTORY_LIMIT,
            metrics_window_secs: system::DEFAULT_METRICS_WINDOW_SECS,
            shutdown_grace_ms: system::DEFAULT_SHUTDOWN_GRACE_MS,
            retry_jitter: true,
            default_policy: TypePolicyConfig::default(),
            types: HashMap::new(),
        }
    }
}

/// Policy fields as they appear in configuration; unset fields inherit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypePolicyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_base_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_max_ms: Option<u64>,
}

impl TypePolicyConfig {
    /// Fill unset fields from `base`.
    pub fn resolve(&self, base: &TypePolicy) -> TypePolicy {
        TypePolicy {
            concurrency: self.concurrency.unwrap_or(base.concurrency),
            timeout: self
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(base.timeout),
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            retry_delay_base: self
                .retry_delay_base_ms
                .map(Duration::from_millis)
                .unwrap_or(base.retry_delay_base),
            retry_delay_max: self
                .retry_delay_max_ms
                .map(Duration::from_millis)
                .unwrap_or(base.retry_delay_max),
        }
    }
}

impl SchedulerConfig {
    /// Load defaults, then `path` (if given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&Self::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            if !path.exists() {
                return Err(SchedulerError::ConfigurationError(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "Loading scheduler configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the environment only.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(SchedulerError::ConfigurationError(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.history_limit == 0 {
            return Err(SchedulerError::ConfigurationError(
                "history_limit must be greater than zero".to_string(),
            ));
        }
        if self.metrics_window_secs == 0 {
            return Err(SchedulerError::ConfigurationError(
                "metrics_window_secs must be greater than zero".to_string(),
            ));
        }

        self.default_policy().validate().map_err(|e| {
            SchedulerError::ConfigurationError(format!("default_policy: {e}"))
        })?;
        for (task_type, policy) in self.policies() {
            policy.validate().map_err(|e| {
                SchedulerError::ConfigurationError(format!("types.{task_type}: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn metrics_window(&self) -> Duration {
        Duration::from_secs(self.metrics_window_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn default_policy(&self) -> TypePolicy {
        self.default_policy.resolve(&TypePolicy::default())
    }

    /// Resolved policy for every configured type, sorted by type name.
    pub fn policies(&self) -> Vec<(String, TypePolicy)> {
        let base = self.default_policy();
        let mut policies: Vec<(String, TypePolicy)> = self
            .types
            .iter()
            .map(|(task_type, policy)| (task_type.clone(), policy.resolve(&base)))
            .collect();
        policies.sort_by(|a, b| a.0.cmp(&b.0));
        policies
    }
}
