//! # Models
//!
//! Data types shared by every scheduler component.
//!
//! - [`Task`] / [`TaskId`] - a unit of work and its lifecycle bookkeeping
//! - [`TaskPriority`] - dispatch ordering within a task type
//! - [`TypePolicy`] / [`TypePolicyUpdate`] - per-type concurrency, timeout and retry settings

pub mod priority;
pub mod task;
pub mod type_policy;

pub use priority::TaskPriority;
pub use task::{Task, TaskId};

/// Point-in-time copy of a task as returned by queries
pub type TaskSnapshot = Task;
pub use type_policy::{TypePolicy, TypePolicyUpdate};
