//! # Scheduler
//!
//! The single dispatch authority. Each pass walks every registered task type, computes the
//! free slots under the type's current policy, takes that many eligible entries from the
//! ready queue and hands each one to the executor on its own tokio task.
//!
//! ## Dispatch protocol
//!
//! 1. `take_eligible(type, free, now)` removes entries atomically from the ready queue
//! 2. a slot is reserved per entry; if the reservation loses a race, that entry and the
//!    rest of the batch go back to the ready queue unchanged
//! 3. the store transition `Pending -> Running` captures the timeout and retry snapshot
//! 4. the handler runs; its outcome goes through the [`RetryManager`]
//! 5. the slot is released after the store reflects the outcome
//!
//! The loop started by [`Scheduler::start`] runs a pass on every tick of a fixed interval
//! and whenever it is woken by an enqueue or a completion.

use crate::clock::Clock;
use crate::constants::events;
use crate::error::{Result, SchedulerError};
use crate::logging::log_error;
use crate::metrics::MetricsCollector;
use crate::models::{TaskId, TypePolicy};
use crate::orchestration::concurrency_tracker::{ConcurrencyTracker, SlotGuard};
use crate::orchestration::executor::{ExecutionOutcome, Executor};
use crate::orchestration::ready_queue::{ReadyEntry, ReadyQueue};
use crate::orchestration::retry_manager::RetryManager;
use crate::orchestration::task_store::TaskStore;
use crate::registry::{HandlerContext, TaskHandlerRegistry, TypePolicyRegistry};
use crate::state_machine::TaskEvent;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Shared components the scheduler dispatches against
#[derive(Debug, Clone)]
pub struct SchedulerComponents {
    pub policies: Arc<TypePolicyRegistry>,
    pub handlers: Arc<TaskHandlerRegistry>,
    pub store: Arc<TaskStore>,
    pub ready_queue: Arc<ReadyQueue>,
    pub tracker: Arc<ConcurrencyTracker>,
    pub metrics: Arc<MetricsCollector>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug)]
pub struct Scheduler {
    components: SchedulerComponents,
    retry_manager: RetryManager,
    executor: Executor,
    tick_interval: Duration,
    wake: Notify,
    /// Stops the loop and new dispatches
    shutdown: CancellationToken,
    /// Parent of every handler's cancellation token
    handler_cancellation: CancellationToken,
    in_flight: TaskTracker,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        components: SchedulerComponents,
        retry_manager: RetryManager,
        tick_interval: Duration,
    ) -> Self {
        Self {
            components,
            retry_manager,
            executor: Executor::new(),
            tick_interval,
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
            handler_cancellation: CancellationToken::new(),
            in_flight: TaskTracker::new(),
            loop_handle: Mutex::new(None),
        }
    }

    pub fn retry_manager(&self) -> &RetryManager {
        &self.retry_manager
    }

    pub fn is_running(&self) -> bool {
        self.loop_handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Handler invocations that have been dispatched and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Ask the loop to run a pass without waiting for the next tick.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Run one scheduling pass and return the number of tasks dispatched.
    ///
    /// Must be called from within a tokio runtime; handlers are spawned onto it.
    pub fn tick(self: &Arc<Self>) -> usize {
        if self.shutdown.is_cancelled() {
            return 0;
        }
        let now = self.components.clock.now();
        let mut dispatched = 0;

        for task_type in self.components.policies.types() {
            let Ok(policy) = self.components.policies.get_policy(&task_type) else {
                continue;
            };
            dispatched += self.dispatch_type(&task_type, &policy, now);
        }

        if dispatched > 0 {
            debug!(dispatched = dispatched, "Scheduling pass complete");
        }
        dispatched
    }

    fn dispatch_type(self: &Arc<Self>, task_type: &str, policy: &TypePolicy, now: DateTime<Utc>) -> usize {
        let free = self
            .components
            .tracker
            .available(task_type, policy.concurrency);
        if free == 0 {
            return 0;
        }

        let mut entries = self
            .components
            .ready_queue
            .take_eligible(task_type, free, now)
            .into_iter();
        let mut dispatched = 0;

        while let Some(entry) = entries.next() {
            let Some(slot) = self
                .components
                .tracker
                .reserve_guard(task_type, policy.concurrency)
            else {
                debug!(
                    task_type = %task_type,
                    "Concurrency slot lost to a concurrent pass, returning batch to the queue"
                );
                self.components.ready_queue.restore(entry);
                entries.by_ref().for_each(|rest| self.components.ready_queue.restore(rest));
                break;
            };

            if self.dispatch(entry, slot, policy, now) {
                dispatched += 1;
            }
        }
        dispatched
    }

    fn dispatch(self: &Arc<Self>, entry: ReadyEntry, slot: SlotGuard, policy: &TypePolicy, now: DateTime<Utc>) -> bool {
        let handler = match self.components.handlers.resolve(&entry.task_type) {
            Ok(handler) => handler,
            Err(e) => {
                error!(
                    task_id = %entry.task_id,
                    task_type = %entry.task_type,
                    error = %e,
                    "No handler for queued task, leaving it pending"
                );
                self.components.ready_queue.restore(entry);
                return false;
            }
        };

        let transition = self.components.store.update(&entry.task_id, |task| {
            if task.attempts == 0 && !task.max_retries_overridden {
                task.max_retries = policy.max_retries;
            }
            task.attempts += 1;
            task.started_at = Some(now);
            task.completed_at = None;
            task.timeout = Some(policy.timeout);
            TaskEvent::Dispatch
        });
        let task = match transition {
            Ok(transition) => {
                self.components
                    .metrics
                    .record_transition(transition.from, transition.to);
                transition.task
            }
            Err(e) => {
                warn!(
                    task_id = %entry.task_id,
                    task_type = %entry.task_type,
                    error = %e,
                    "Dropping queue entry that is no longer dispatchable"
                );
                return false;
            }
        };

        info!(
            event = events::TASK_DISPATCHED,
            task_id = %task.id,
            task_type = %task.task_type,
            priority = %task.priority,
            attempt = task.attempts,
            retry_count = task.retry_count,
            "Task dispatched"
        );

        let ctx = HandlerContext {
            task_id: task.id,
            task_type: task.task_type.clone(),
            attempt: task.attempts,
            cancellation: self.handler_cancellation.child_token(),
        };
        let timeout = policy.timeout;
        let scheduler = Arc::clone(self);

        self.in_flight.spawn(async move {
            let outcome = scheduler
                .executor
                .execute(handler, task.payload, ctx, timeout)
                .await;
            scheduler.finish(&task.id, outcome, slot);
        });
        true
    }

    fn finish(&self, task_id: &TaskId, outcome: ExecutionOutcome, slot: SlotGuard) {
        let routed = match outcome.result {
            Ok(value) => self.retry_manager.complete(task_id, value, outcome.elapsed),
            Err(error) => self.retry_manager.fail(task_id, &error, outcome.elapsed),
        };
        if let Err(e) = routed {
            let task_id = task_id.to_string();
            log_error("scheduler", "record_outcome", &e.to_string(), Some(&task_id));
        }

        slot.release();
        self.wake();
    }

    /// Spawn the scheduling loop onto the current tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::InvalidState(
                "scheduler has been shut down".to_string(),
            ));
        }
        let mut handle = self.loop_handle.lock();
        if handle.is_some() {
            return Err(SchedulerError::InvalidState(
                "scheduler is already running".to_string(),
            ));
        }

        let scheduler = Arc::clone(self);
        *handle = Some(tokio::spawn(async move { scheduler.run().await }));
        info!(
            tick_interval_ms = self.tick_interval.as_millis() as u64,
            "Scheduler loop started"
        );
        Ok(())
    }

    async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
                _ = self.wake.notified() => {}
            }
            self.tick();
        }
        debug!("Scheduler loop stopped");
    }

    /// Signal the loop to stop without waiting for in-flight work.
    pub fn signal_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Stop dispatching and wait up to `grace` for in-flight handlers.
    ///
    /// Returns true when every in-flight handler finished within the grace period. On
    /// expiry the handlers' cancellation tokens are cancelled; their outcomes are still
    /// recorded when they return.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.shutdown.cancel();
        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler loop ended abnormally");
            }
        }

        self.in_flight.close();
        let in_flight = self.in_flight.len();
        let drained = tokio::time::timeout(grace, self.in_flight.wait())
            .await
            .is_ok();

        if drained {
            info!(drained = in_flight, "Scheduler shut down cleanly");
        } else {
            warn!(
                remaining = self.in_flight.len(),
                grace_ms = grace.as_millis() as u64,
                "Grace period expired, cancelling in-flight handlers"
            );
            self.handler_cancellation.cancel();
        }
        drained
    }
}
