//! # Task Model
//!
//! A task is one unit of background work: a type (which selects the policy and handler),
//! an opaque JSON payload, a priority, and the bookkeeping the scheduler needs to dispatch
//! it, retry it and report on it.
//!
//! ## Timestamps
//!
//! - `created_at`: set once by `add_task`; also the FIFO key within a priority
//! - `ready_at`: earliest dispatch time; equals `created_at` initially and is pushed
//!   forward by the retry backoff
//! - `started_at`: time of the most recent dispatch
//! - `completed_at`: time the task reached a terminal state

use crate::state_machine::TaskState;
use crate::models::TaskPriority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: String,
    pub priority: TaskPriority,
    pub status: TaskState,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub ready_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Retries granted so far; never exceeds `max_retries`
    pub retry_count: u32,
    pub max_retries: u32,
    /// True when `max_retries` came from the caller rather than the type policy
    pub max_retries_overridden: bool,
    /// Handler invocations in the current attempt cycle
    pub attempts: u32,
    pub last_error: Option<String>,
    pub error_kind: Option<String>,
    pub result: Option<Value>,
    /// Timeout captured from the policy when the task was last dispatched
    #[serde(default, with = "crate::utils::serde::option_duration_ms")]
    pub timeout: Option<Duration>,
}

impl Task {
    pub fn new(
        task_type: impl Into<String>,
        payload: Value,
        priority: TaskPriority,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            task_type: task_type.into(),
            priority,
            status: TaskState::Pending,
            payload,
            created_at: now,
            ready_at: now,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries,
            max_retries_overridden: false,
            attempts: 0,
            last_error: None,
            error_kind: None,
            result: None,
            timeout: None,
        }
    }

    pub fn with_max_retries_override(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self.max_retries_overridden = true;
        self
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskState::Pending && self.ready_at <= now
    }

    pub fn retries_remaining(&self) -> u32 {
        self.max_retries.saturating_sub(self.retry_count)
    }

    /// Wall-clock time of the last run, when both ends are known.
    pub fn processing_time(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }
}
