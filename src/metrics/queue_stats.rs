//! Diagnostic snapshot returned by `get_queue_stats`: the global metrics plus a per-type
//! breakdown and a dump of every registered policy.

use crate::metrics::{QueueMetrics, TypeMetrics};
use crate::models::TypePolicy;
use crate::state_machine::TaskState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStats {
    pub metrics: QueueMetrics,
    /// Tasks held by the store per status, counted from the store itself
    pub task_counts: BTreeMap<TaskState, usize>,
    /// Earliest `ready_at` among queued tasks
    pub next_ready_at: Option<DateTime<Utc>>,
    pub per_type: Vec<TypeQueueStats>,
    pub policies: BTreeMap<String, TypePolicy>,
}

impl QueueStats {
    pub fn for_type(&self, task_type: &str) -> Option<&TypeQueueStats> {
        self.per_type.iter().find(|stats| stats.task_type == task_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeQueueStats {
    pub task_type: String,
    /// Pending entries in the ready queue, including those still backing off
    pub queued: usize,
    /// Queued entries whose `ready_at` has passed
    pub ready: usize,
    pub running: usize,
    pub concurrency: usize,
    pub available_slots: usize,
    /// Stored tasks of this type in `failed`, eligible for `retry_task`
    pub retryable: usize,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub timed_out: u64,
    pub avg_processing_ms: f64,
}

impl TypeQueueStats {
    pub fn new(
        task_type: &str,
        policy: &TypePolicy,
        queued: usize,
        ready: usize,
        running: usize,
        retryable: usize,
        metrics: &TypeMetrics,
    ) -> Self {
        Self {
            task_type: task_type.to_string(),
            queued,
            ready,
            running,
            concurrency: policy.concurrency,
            available_slots: policy.concurrency.saturating_sub(running),
            retryable,
            completed: metrics.completed,
            failed: metrics.failed,
            retried: metrics.retried,
            timed_out: metrics.timed_out,
            avg_processing_ms: metrics.avg_processing_time_ms,
        }
    }
}
