#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Scheduler
//!
//! In-process background task scheduling engine.
//!
//! ## Overview
//!
//! Tasks are typed units of asynchronous work. Each task type has a policy (how many of
//! its tasks may run at once, how long a handler invocation may take, how failures are
//! retried) and an externally supplied handler. The scheduler dispatches pending tasks in
//! priority order under those limits, retries failures with exponential backoff and keeps
//! operational metrics.
//!
//! ## Guarantees
//!
//! - the number of running tasks of a type never exceeds the type's `concurrency`
//! - within a type, higher priority dispatches first, then oldest first
//! - a retried task is not dispatched before its `ready_at`
//! - a task is invoked at most `max_retries + 1` times per attempt cycle
//! - delivery is at-least-once; handlers must be idempotent
//!
//! ## Module Organization
//!
//! - [`orchestration`] - task queue facade, scheduler loop, executor and retry handling
//! - [`registry`] - type policies and task handlers
//! - [`models`] - tasks, priorities and policies
//! - [`state_machine`] - the task lifecycle transition table
//! - [`metrics`] - counters, throughput and per-type statistics
//! - [`config`] - layered configuration
//! - [`clock`] - injectable time source
//! - [`error`] - structured error handling
//! - [`logging`] - `tracing` initialisation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tasker_scheduler::{FnHandler, HandlerContext, TaskPriority, TaskQueue, TypePolicy};
//!
//! # async fn example() -> tasker_scheduler::Result<()> {
//! tasker_scheduler::logging::init_structured_logging();
//!
//! let queue = TaskQueue::builder().build()?;
//! queue.register_type(
//!     "email",
//!     TypePolicy::new(4, Duration::from_secs(30), 3),
//!     Arc::new(FnHandler::new(|payload: Value, _ctx: HandlerContext| async move {
//!         Ok(json!({ "sent_to": payload["to"] }))
//!     })),
//! )?;
//! queue.start()?;
//!
//! let id = queue.add_task("email", json!({ "to": "ops@example.com" }), TaskPriority::High)?;
//! println!("{:?}", queue.get_task_status(&id)?.status);
//!
//! queue.shutdown_gracefully().await;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod state_machine;
pub mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SchedulerConfig, TypePolicyConfig};
pub use error::{HandlerError, Result, SchedulerError, SchedulerResult};
pub use metrics::{QueueMetrics, QueueStats, TypeQueueStats};
pub use models::{Task, TaskId, TaskPriority, TaskSnapshot, TypePolicy, TypePolicyUpdate};
pub use orchestration::{AddTaskOptions, TaskQueue, TaskQueueBuilder};
pub use registry::{FnHandler, HandlerContext, TaskHandler, TypedHandler};
pub use state_machine::TaskState;
