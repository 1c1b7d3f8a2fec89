//! # Task Handler Registry
//!
//! Maps each task type to the externally supplied [`TaskHandler`] that performs its work.
//!
//! Handlers must be idempotent: delivery is at-least-once, and an attempt that timed out
//! after partially succeeding is retried like any other failure.
//!
//! ## Payload validation
//!
//! Payloads are JSON values tagged by the task type they were submitted under. Each handler
//! gets to reject a payload whose shape it cannot process through
//! [`TaskHandler::validate_payload`]; `add_task` calls it before the task is created, so a
//! mismatch surfaces as a `ValidationError` at submission rather than inside the handler.
//! [`TypedHandler`] derives that check from a `Deserialize` payload type.
//!
//! ```rust
//! use serde::Deserialize;
//! use serde_json::json;
//! use tasker_scheduler::registry::{HandlerContext, TaskHandler, TypedHandler};
//!
//! #[derive(Deserialize)]
//! struct SendEmail {
//!     to: String,
//! }
//!
//! let handler = TypedHandler::new(|email: SendEmail, _ctx: HandlerContext| async move {
//!     Ok(json!({ "delivered_to": email.to }))
//! });
//! assert!(handler.validate_payload(&json!({ "to": "ops@example.com" })).is_ok());
//! assert!(handler.validate_payload(&json!({ "subject": "missing to" })).is_err());
//! ```

use crate::error::{Result, SchedulerError};
use crate::models::TaskId;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Per-invocation context handed to a handler
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub task_id: TaskId,
    pub task_type: String,
    /// 1-based invocation number within the current attempt cycle
    pub attempt: u32,
    /// Cancelled when the invocation times out; long-running handlers should watch it
    pub cancellation: CancellationToken,
}

impl HandlerContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Reject payloads this handler cannot process.
    fn validate_payload(&self, _payload: &Value) -> std::result::Result<(), String> {
        Ok(())
    }

    async fn handle(&self, payload: Value, ctx: HandlerContext) -> anyhow::Result<Value>;
}

/// Handler backed by a closure over the raw JSON payload.
pub struct FnHandler<F> {
    func: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(Value, HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(Value, HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn handle(&self, payload: Value, ctx: HandlerContext) -> anyhow::Result<Value> {
        (self.func)(payload, ctx).await
    }
}

/// Handler whose payload must deserialize into `P`.
pub struct TypedHandler<P, F> {
    func: F,
    _payload: PhantomData<fn() -> P>,
}

impl<P, F, Fut> TypedHandler<P, F>
where
    P: DeserializeOwned + Send + 'static,
    F: Fn(P, HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            _payload: PhantomData,
        }
    }
}

#[async_trait]
impl<P, F, Fut> TaskHandler for TypedHandler<P, F>
where
    P: DeserializeOwned + Send + 'static,
    F: Fn(P, HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    fn validate_payload(&self, payload: &Value) -> std::result::Result<(), String> {
        P::deserialize(payload)
            .map(|_| ())
            .map_err(|e| format!("payload does not match {}: {e}", std::any::type_name::<P>()))
    }

    async fn handle(&self, payload: Value, ctx: HandlerContext) -> anyhow::Result<Value> {
        let typed: P = serde_json::from_value(payload)?;
        (self.func)(typed, ctx).await
    }
}

#[derive(Default)]
pub struct TaskHandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
}

impl std::fmt::Debug for TaskHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandlerRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}

impl TaskHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `task_type`.
    pub fn register(&self, task_type: &str, handler: Arc<dyn TaskHandler>) {
        debug!(task_type = %task_type, "Registered task handler");
        self.handlers.write().insert(task_type.to_string(), handler);
    }

    pub fn resolve(&self, task_type: &str) -> Result<Arc<dyn TaskHandler>> {
        self.handlers
            .read()
            .get(task_type)
            .cloned()
            .ok_or_else(|| SchedulerError::type_not_found(task_type))
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.read().contains_key(task_type)
    }

    /// Run the handler's payload check, mapping a rejection to `ValidationError`.
    pub fn validate_payload(&self, task_type: &str, payload: &Value) -> Result<()> {
        let handler = self.resolve(task_type).map_err(|_| {
            SchedulerError::ValidationError(format!("no handler registered for type '{task_type}'"))
        })?;
        handler.validate_payload(payload).map_err(|reason| {
            SchedulerError::ValidationError(format!("invalid payload for '{task_type}': {reason}"))
        })
    }

    /// Task types with a registered handler, sorted.
    pub fn task_types(&self) -> Vec<String> {
        let mut task_types: Vec<String> = self.handlers.read().keys().cloned().collect();
        task_types.sort();
        task_types
    }
}
