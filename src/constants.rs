//! # System Constants
//!
//! Defaults and stable identifiers shared across the scheduler: policy defaults,
//! operational limits, lifecycle event names and the error codes recorded on tasks.

/// Lifecycle events emitted through structured logging
pub mod events {
    pub const TASK_ENQUEUED: &str = "task.enqueued";
    pub const TASK_DISPATCHED: &str = "task.dispatched";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_RETRY_SCHEDULED: &str = "task.retry_scheduled";
    pub const TASK_FAILED: &str = "task.failed";
    pub const TASK_CANCELLED: &str = "task.cancelled";
    pub const TASK_RETRY_REQUESTED: &str = "task.retry_requested";
    pub const POLICY_REGISTERED: &str = "policy.registered";
    pub const POLICY_UPDATED: &str = "policy.updated";
}

/// Codes stored in `Task::error_kind`
pub mod error_kinds {
    pub const HANDLER_ERROR: &str = "HANDLER_ERROR";
    pub const EXECUTION_TIMEOUT: &str = "EXECUTION_TIMEOUT";
    pub const HANDLER_CANCELLED: &str = "HANDLER_CANCELLED";
    pub const HANDLER_PANIC: &str = "HANDLER_PANIC";
}

/// Default type policy values
pub mod policy_defaults {
    pub const CONCURRENCY: usize = 5;
    pub const TIMEOUT_MS: u64 = 30_000;
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_DELAY_BASE_MS: u64 = 1_000;
    pub const RETRY_DELAY_MAX_MS: u64 = 60_000;
}

/// System-wide limits
pub mod system {
    pub const DEFAULT_TICK_INTERVAL_MS: u64 = 500;
    pub const DEFAULT_HISTORY_LIMIT: usize = 1_000;
    pub const DEFAULT_METRICS_WINDOW_SECS: u64 = 60;
    pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

    /// Upper bound of the random jitter added to a retry delay, as a fraction of the delay
    pub const MAX_JITTER_RATIO: f64 = 0.1;

    /// Processing-time samples kept per task type for the rolling average
    pub const LATENCY_SAMPLE_SIZE: usize = 100;

    /// Completion timestamps kept for throughput before old ones are pruned
    pub const MAX_THROUGHPUT_SAMPLES: usize = 10_000;
}
