use serde::{Deserialize, Serialize};

/// Events that can trigger task state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TaskEvent {
    /// Scheduler reserved a slot and handed the task to the executor
    Dispatch,
    /// Handler resolved
    Complete,
    /// Handler failed with retries remaining
    RetryScheduled(String),
    /// Handler failed with retries exhausted
    FailPermanently(String),
    /// Caller cancelled a pending task
    Cancel,
    /// Caller asked for a fresh attempt cycle on a failed task
    ManualRetry,
}

impl TaskEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Complete => "complete",
            Self::RetryScheduled(_) => "retry_scheduled",
            Self::FailPermanently(_) => "fail_permanently",
            Self::Cancel => "cancel",
            Self::ManualRetry => "manual_retry",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::RetryScheduled(msg) | Self::FailPermanently(msg) => Some(msg),
            _ => None,
        }
    }
}
