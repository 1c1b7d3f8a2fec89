//! # Retry Manager
//!
//! Routes the outcome of a handler invocation back into the task store.
//!
//! - Success: the task completes with the handler's result.
//! - Failure with retries remaining: `retry_count` is incremented, `ready_at` is pushed
//!   forward by the backoff delay and the task goes back to the ready queue as pending.
//!   The ready queue's `ready_at` filter is what holds it back until the delay elapses.
//! - Failure with retries exhausted: the task fails permanently.
//!
//! The manager never touches concurrency slots. The caller releases the slot after the
//! outcome has been recorded here.

use crate::clock::{add_duration, Clock};
use crate::constants::events;
use crate::error::{HandlerError, Result};
use crate::metrics::{AttemptOutcome, MetricsCollector};
use crate::models::{Task, TaskId};
use crate::orchestration::backoff_calculator::BackoffCalculator;
use crate::orchestration::ready_queue::ReadyQueue;
use crate::orchestration::task_store::TaskStore;
use crate::registry::TypePolicyRegistry;
use crate::state_machine::TaskEvent;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What happened to a task after an invocation finished
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Completed,
    Retry {
        retry_count: u32,
        delay: Duration,
        ready_at: DateTime<Utc>,
    },
    Failed,
}

#[derive(Debug)]
pub struct RetryManager {
    backoff: BackoffCalculator,
    policies: Arc<TypePolicyRegistry>,
    store: Arc<TaskStore>,
    ready_queue: Arc<ReadyQueue>,
    metrics: Arc<MetricsCollector>,
    clock: Arc<dyn Clock>,
}

impl RetryManager {
    pub fn new(
        backoff: BackoffCalculator,
        policies: Arc<TypePolicyRegistry>,
        store: Arc<TaskStore>,
        ready_queue: Arc<ReadyQueue>,
        metrics: Arc<MetricsCollector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backoff,
            policies,
            store,
            ready_queue,
            metrics,
            clock,
        }
    }

    pub fn backoff(&self) -> &BackoffCalculator {
        &self.backoff
    }

    /// Record a successful invocation.
    pub fn complete(&self, task_id: &TaskId, result: Value, elapsed: Duration) -> Result<RetryDecision> {
        let now = self.clock.now();
        let transition = self.store.update(task_id, |task| {
            task.completed_at = Some(now);
            task.result = Some(result);
            TaskEvent::Complete
        })?;
        let task = &transition.task;

        self.metrics.record_transition(transition.from, transition.to);
        self.metrics
            .record_attempt(&task.task_type, elapsed, AttemptOutcome::Succeeded, None);
        self.metrics.record_completed(&task.task_type, now);

        info!(
            event = events::TASK_COMPLETED,
            task_id = %task.id,
            task_type = %task.task_type,
            retry_count = task.retry_count,
            duration_ms = elapsed.as_millis() as u64,
            "Task completed"
        );
        Ok(RetryDecision::Completed)
    }

    /// Record a failed invocation and decide between retry and permanent failure.
    pub fn fail(&self, task_id: &TaskId, error: &HandlerError, elapsed: Duration) -> Result<RetryDecision> {
        let now = self.clock.now();
        let task_type = self
            .store
            .task_type(task_id)
            .ok_or_else(|| crate::error::SchedulerError::task_not_found(task_id))?;
        let policy = self.policies.get_policy(&task_type).unwrap_or_default();
        let message = error.to_string();

        let mut decision = RetryDecision::Failed;
        let transition = self.store.update(task_id, |task| {
            task.last_error = Some(message.clone());
            task.error_kind = Some(error.error_kind().to_string());

            if task.retry_count < task.max_retries {
                task.retry_count += 1;
                let backoff = self.backoff.delay_for(task.retry_count, &policy);
                task.ready_at = add_duration(now, backoff.delay);
                decision = RetryDecision::Retry {
                    retry_count: task.retry_count,
                    delay: backoff.delay,
                    ready_at: task.ready_at,
                };
                TaskEvent::RetryScheduled(message.clone())
            } else {
                task.completed_at = Some(now);
                TaskEvent::FailPermanently(message.clone())
            }
        })?;
        let task = &transition.task;

        self.metrics.record_transition(transition.from, transition.to);
        let outcome = if error.is_timeout() {
            AttemptOutcome::TimedOut
        } else {
            AttemptOutcome::Failed
        };
        self.metrics
            .record_attempt(&task.task_type, elapsed, outcome, Some(error.error_kind()));

        match &decision {
            RetryDecision::Retry { delay, .. } => {
                self.ready_queue.enqueue(task);
                self.metrics.record_retry(&task.task_type);
                self.log_retry(task, *delay);
            }
            _ => {
                self.metrics.record_failed(&task.task_type);
                warn!(
                    event = events::TASK_FAILED,
                    task_id = %task.id,
                    task_type = %task.task_type,
                    retry_count = task.retry_count,
                    max_retries = task.max_retries,
                    error = %message,
                    "Task failed permanently"
                );
            }
        }
        Ok(decision)
    }

    fn log_retry(&self, task: &Task, delay: Duration) {
        info!(
            event = events::TASK_RETRY_SCHEDULED,
            task_id = %task.id,
            task_type = %task.task_type,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = task.last_error.as_deref().unwrap_or_default(),
            "Task failed, retry scheduled"
        );
    }
}
