//! Error types for the task scheduler.
//!
//! Two families live here. [`SchedulerError`] is returned synchronously from public
//! operations (unknown task type, bad policy values, unknown task id). [`HandlerError`]
//! describes why a handler invocation failed; it never reaches the caller of
//! `add_task` and is instead recorded on the task and fed into the retry path.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn task_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "task",
            id: id.to_string(),
        }
    }

    pub fn type_not_found(task_type: impl ToString) -> Self {
        Self::NotFound {
            kind: "task type",
            id: task_type.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationError(_))
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(error: serde_json::Error) -> Self {
        SchedulerError::ValidationError(format!("JSON serialization error: {error}"))
    }
}

impl From<config::ConfigError> for SchedulerError {
    fn from(error: config::ConfigError) -> Self {
        SchedulerError::ConfigurationError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
pub type SchedulerResult<T> = Result<T>;

/// Failure of a single handler invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HandlerError {
    #[error("Handler failed: {0}")]
    Failed(String),
    #[error("Handler timed out after {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("Handler was cancelled")]
    Cancelled,
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Stable code stored on the task next to the error message.
    pub fn error_kind(&self) -> &'static str {
        use crate::constants::error_kinds;
        match self {
            Self::Failed(_) => error_kinds::HANDLER_ERROR,
            Self::Timeout { .. } => error_kinds::EXECUTION_TIMEOUT,
            Self::Cancelled => error_kinds::HANDLER_CANCELLED,
            Self::Panicked(_) => error_kinds::HANDLER_PANIC,
        }
    }
}
