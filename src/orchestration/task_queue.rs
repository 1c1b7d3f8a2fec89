//! # Task Queue
//!
//! The public face of the scheduler. A `TaskQueue` is constructed explicitly (there is no
//! process-wide instance) and owns every component: registries, task store, ready queue,
//! concurrency tracker, metrics and the scheduler loop. Share it with `Arc` when several
//! parts of an application need it.
//!
//! ```rust
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tasker_scheduler::models::{TaskPriority, TypePolicy};
//! use tasker_scheduler::orchestration::TaskQueue;
//! use tasker_scheduler::registry::{FnHandler, HandlerContext};
//! use tasker_scheduler::state_machine::TaskState;
//!
//! # tokio_test::block_on(async {
//! let queue = TaskQueue::builder().build().unwrap();
//! queue
//!     .register_type(
//!         "email",
//!         TypePolicy::new(2, Duration::from_secs(5), 3),
//!         Arc::new(FnHandler::new(|payload: Value, _ctx: HandlerContext| async move {
//!             Ok(json!({ "sent_to": payload["to"] }))
//!         })),
//!     )
//!     .unwrap();
//!
//! let id = queue
//!     .add_task("email", json!({ "to": "ops@example.com" }), TaskPriority::High)
//!     .unwrap();
//! assert_eq!(queue.tick(), 1);
//! queue.shutdown(Duration::from_secs(1)).await;
//! assert_eq!(queue.get_task_status(&id).unwrap().status, TaskState::Completed);
//! # });
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerConfig;
use crate::constants::events;
use crate::error::{Result, SchedulerError};
use crate::logging::log_task_operation;
use crate::metrics::{MetricsCollector, QueueMetrics, QueueStats, TypeQueueStats};
use crate::models::{Task, TaskId, TaskPriority, TypePolicy, TypePolicyUpdate};
use crate::orchestration::backoff_calculator::{BackoffCalculator, BackoffCalculatorConfig};
use crate::orchestration::concurrency_tracker::ConcurrencyTracker;
use crate::orchestration::ready_queue::ReadyQueue;
use crate::orchestration::retry_manager::RetryManager;
use crate::orchestration::scheduler::{Scheduler, SchedulerComponents};
use crate::orchestration::task_store::TaskStore;
use crate::registry::{TaskHandler, TaskHandlerRegistry, TypePolicyRegistry};
use crate::state_machine::{TaskEvent, TaskState};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Per-call options for [`TaskQueue::add_task_with_options`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddTaskOptions {
    /// Replaces the type policy's `max_retries` for this task
    pub max_retries: Option<u32>,
}

impl AddTaskOptions {
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

#[derive(Debug, Default)]
pub struct TaskQueueBuilder {
    config: Option<SchedulerConfig>,
    clock: Option<Arc<dyn Clock>>,
    backoff: Option<BackoffCalculator>,
}

impl TaskQueueBuilder {
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn backoff(mut self, backoff: BackoffCalculator) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn build(self) -> Result<TaskQueue> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let backoff = match self.backoff {
            Some(backoff) => backoff,
            None => BackoffCalculator::new(BackoffCalculatorConfig {
                jitter_enabled: config.retry_jitter,
                ..BackoffCalculatorConfig::default()
            })?,
        };

        let policies = Arc::new(TypePolicyRegistry::new());
        for (task_type, policy) in config.policies() {
            policies.register_type(&task_type, policy)?;
        }

        let components = SchedulerComponents {
            policies,
            handlers: Arc::new(TaskHandlerRegistry::new()),
            store: Arc::new(TaskStore::new(config.history_limit)),
            ready_queue: Arc::new(ReadyQueue::new()),
            tracker: Arc::new(ConcurrencyTracker::new()),
            metrics: Arc::new(MetricsCollector::new(clock.now(), config.metrics_window())),
            clock,
        };
        let retry_manager = RetryManager::new(
            backoff,
            components.policies.clone(),
            components.store.clone(),
            components.ready_queue.clone(),
            components.metrics.clone(),
            components.clock.clone(),
        );
        let scheduler = Arc::new(Scheduler::new(
            components.clone(),
            retry_manager,
            config.tick_interval(),
        ));

        Ok(TaskQueue {
            components,
            scheduler,
            config,
        })
    }
}

#[derive(Debug)]
pub struct TaskQueue {
    components: SchedulerComponents,
    scheduler: Arc<Scheduler>,
    config: SchedulerConfig,
}

impl TaskQueue {
    pub fn builder() -> TaskQueueBuilder {
        TaskQueueBuilder::default()
    }

    /// Queue with default configuration and the system clock.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ---- registration -------------------------------------------------------------

    /// Register a task type with its policy and handler.
    pub fn register_type(
        &self,
        task_type: &str,
        policy: TypePolicy,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<()> {
        self.components.policies.register_type(task_type, policy)?;
        self.components.handlers.register(task_type, handler);
        self.scheduler.wake();
        Ok(())
    }

    /// Attach a handler to a type whose policy came from configuration.
    pub fn register_handler(&self, task_type: &str, handler: Arc<dyn TaskHandler>) -> Result<()> {
        if !self.components.policies.contains(task_type) {
            return Err(SchedulerError::type_not_found(task_type));
        }
        self.components.handlers.register(task_type, handler);
        self.scheduler.wake();
        Ok(())
    }

    // ---- task lifecycle -----------------------------------------------------------

    pub fn add_task(&self, task_type: &str, payload: Value, priority: TaskPriority) -> Result<TaskId> {
        self.add_task_with_options(task_type, payload, priority, AddTaskOptions::default())
    }

    /// Create a pending task. Fails with `ValidationError` when the type has no policy or
    /// handler, or when the handler rejects the payload; nothing is created in that case.
    pub fn add_task_with_options(
        &self,
        task_type: &str,
        payload: Value,
        priority: TaskPriority,
        options: AddTaskOptions,
    ) -> Result<TaskId> {
        let policy = self.components.policies.get_policy(task_type).map_err(|_| {
            SchedulerError::ValidationError(format!("no policy registered for type '{task_type}'"))
        })?;
        self.components
            .handlers
            .validate_payload(task_type, &payload)?;

        let now = self.components.clock.now();
        let mut task = Task::new(task_type, payload, priority, policy.max_retries, now);
        if let Some(max_retries) = options.max_retries {
            task = task.with_max_retries_override(max_retries);
        }
        let task_id = task.id;

        self.components.store.insert(task.clone())?;
        self.components.metrics.record_created();
        self.components.ready_queue.enqueue(&task);

        info!(
            event = events::TASK_ENQUEUED,
            task_id = %task_id,
            task_type = %task_type,
            priority = %priority,
            max_retries = task.max_retries,
            "Task enqueued"
        );
        self.scheduler.wake();
        Ok(task_id)
    }

    pub fn get_task_status(&self, task_id: &TaskId) -> Result<Task> {
        self.components
            .store
            .get(task_id)
            .ok_or_else(|| SchedulerError::task_not_found(task_id))
    }

    /// Cancel a pending task. Returns false when the task is running or finished.
    pub fn cancel_task(&self, task_id: &TaskId) -> Result<bool> {
        let task_type = self
            .components
            .store
            .task_type(task_id)
            .ok_or_else(|| SchedulerError::task_not_found(task_id))?;

        // Only a task still in the ready queue is pending and undispatched.
        if !self.components.ready_queue.remove(&task_type, task_id) {
            debug!(task_id = %task_id, "Cancel rejected, task is not pending");
            return Ok(false);
        }

        let now = self.components.clock.now();
        let transition = self.components.store.update(task_id, |task| {
            task.completed_at = Some(now);
            TaskEvent::Cancel
        })?;
        self.components
            .metrics
            .record_transition(transition.from, transition.to);

        info!(
            event = events::TASK_CANCELLED,
            task_id = %task_id,
            task_type = %task_type,
            "Task cancelled"
        );
        log_task_operation("cancel", Some(*task_id), Some(&task_type), TaskState::Cancelled.as_str(), None);
        Ok(true)
    }

    /// Start a fresh attempt cycle for a failed task. Returns false for any other status.
    pub fn retry_task(&self, task_id: &TaskId) -> Result<bool> {
        let task_type = self
            .components
            .store
            .task_type(task_id)
            .ok_or_else(|| SchedulerError::task_not_found(task_id))?;
        let policy = self.components.policies.get_policy(&task_type)?;
        let now = self.components.clock.now();

        let transition = self.components.store.update(task_id, |task| {
            task.retry_count = 0;
            task.attempts = 0;
            task.last_error = None;
            task.error_kind = None;
            task.result = None;
            task.ready_at = now;
            task.started_at = None;
            task.completed_at = None;
            task.timeout = None;
            if !task.max_retries_overridden {
                task.max_retries = policy.max_retries;
            }
            TaskEvent::ManualRetry
        });
        let transition = match transition {
            Ok(transition) => transition,
            Err(SchedulerError::InvalidState(_)) => {
                debug!(task_id = %task_id, "Retry rejected, task has not failed");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        self.components
            .metrics
            .record_transition(transition.from, transition.to);
        self.components.ready_queue.enqueue(&transition.task);

        info!(
            event = events::TASK_RETRY_REQUESTED,
            task_id = %task_id,
            task_type = %task_type,
            max_retries = transition.task.max_retries,
            "Failed task re-queued"
        );
        log_task_operation("retry", Some(*task_id), Some(&task_type), TaskState::Pending.as_str(), None);
        self.scheduler.wake();
        Ok(true)
    }

    // ---- policy -------------------------------------------------------------------

    /// Merge `update` into the type's policy. Returns false when the update is empty.
    ///
    /// Tasks already running keep the timeout and retry budget captured at dispatch;
    /// lowering `concurrency` never preempts them.
    pub fn update_worker_config(&self, task_type: &str, update: TypePolicyUpdate) -> Result<bool> {
        if !self.components.policies.contains(task_type) {
            return Err(SchedulerError::type_not_found(task_type));
        }
        if update.is_empty() {
            return Ok(false);
        }
        self.components.policies.update_policy(task_type, &update)?;
        self.scheduler.wake();
        Ok(true)
    }

    pub fn get_policy(&self, task_type: &str) -> Result<TypePolicy> {
        self.components.policies.get_policy(task_type)
    }

    // ---- diagnostics --------------------------------------------------------------

    pub fn get_metrics(&self) -> QueueMetrics {
        self.components
            .metrics
            .snapshot(self.components.clock.now())
    }

    pub fn get_queue_stats(&self) -> QueueStats {
        let now = self.components.clock.now();
        let policies = self.components.policies.snapshot();
        let per_type = policies
            .iter()
            .map(|(task_type, policy)| {
                TypeQueueStats::new(
                    task_type,
                    policy,
                    self.components.ready_queue.len_for(task_type),
                    self.components.ready_queue.ready_len_for(task_type, now),
                    self.components.tracker.running(task_type),
                    self.components.store.count_for(task_type, TaskState::Failed),
                    &self.components.metrics.type_metrics(task_type),
                )
            })
            .collect();

        QueueStats {
            metrics: self.components.metrics.snapshot(now),
            task_counts: self.components.store.status_counts(),
            next_ready_at: self.components.ready_queue.next_ready_at(),
            per_type,
            policies,
        }
    }

    /// Most recently finished tasks, newest first.
    pub fn get_task_history(&self, limit: usize) -> Vec<Task> {
        self.components.store.history(limit)
    }

    // ---- scheduling ---------------------------------------------------------------

    /// Run one scheduling pass now. Returns the number of tasks dispatched.
    pub fn tick(&self) -> usize {
        self.scheduler.tick()
    }

    /// Start the background scheduling loop on the current tokio runtime.
    pub fn start(&self) -> Result<()> {
        self.scheduler.start()
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Stop the loop and wait up to `grace` for running handlers. Returns true when every
    /// running handler finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.scheduler.shutdown(grace).await
    }

    /// [`TaskQueue::shutdown`] with the configured grace period.
    pub async fn shutdown_gracefully(&self) -> bool {
        self.shutdown(self.config.shutdown_grace()).await
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.scheduler.signal_shutdown();
    }
}
