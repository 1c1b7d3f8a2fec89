//! # Registries
//!
//! Lookup tables consulted by every other scheduler component.
//!
//! ```text
//! Registries
//! ├── TypePolicyRegistry   (concurrency / timeout / retry policy per task type)
//! └── TaskHandlerRegistry  (externally supplied handler per task type)
//! ```
//!
//! A task type is only accepted by `add_task` once it has both a policy and a handler.

pub mod policy_registry;
pub mod task_handler_registry;

pub use policy_registry::TypePolicyRegistry;
pub use task_handler_registry::{
    FnHandler, HandlerContext, TaskHandler, TaskHandlerRegistry, TypedHandler,
};
