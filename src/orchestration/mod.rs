//! # Orchestration Engine
//!
//! Dispatch, execution and retry of background tasks.
//!
//! ## Core Components
//!
//! - **TaskQueue**: public facade; owns every component and exposes the task lifecycle API
//! - **TaskStore**: every task by id, status changes validated by the state machine
//! - **ReadyQueue**: pending tasks per type, ordered by priority then age, gated by `ready_at`
//! - **ConcurrencyTracker**: per-type running counters with atomic reserve/release
//! - **Scheduler**: the tick loop that moves eligible tasks into execution
//! - **Executor**: runs one handler invocation under a timeout
//! - **RetryManager**: routes outcomes to completion, backoff retry or permanent failure
//! - **BackoffCalculator**: exponential retry delays with bounded jitter
//!
//! ```text
//! add_task ──> TaskStore + ReadyQueue ──> Scheduler ──> ConcurrencyTracker (reserve)
//!                     ^                                      │
//!                     │                                      v
//!              RetryManager <──────── outcome ───────── Executor ──> handler
//!                     │
//!                     └──> ConcurrencyTracker (release)
//! ```

pub mod backoff_calculator;
pub mod concurrency_tracker;
pub mod executor;
pub mod ready_queue;
pub mod retry_manager;
pub mod scheduler;
pub mod task_queue;
pub mod task_store;

pub use backoff_calculator::{BackoffCalculator, BackoffCalculatorConfig, BackoffResult};
pub use concurrency_tracker::{ConcurrencyTracker, SlotGuard};
pub use executor::{ExecutionOutcome, Executor};
pub use ready_queue::{ReadyEntry, ReadyQueue};
pub use retry_manager::{RetryDecision, RetryManager};
pub use scheduler::{Scheduler, SchedulerComponents};
pub use task_queue::{AddTaskOptions, TaskQueue, TaskQueueBuilder};
pub use task_store::{TaskStore, Transition};
