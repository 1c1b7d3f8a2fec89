//! # Executor
//!
//! Runs one handler invocation under the timeout captured at dispatch.
//!
//! The handler future is spawned as its own tokio task and raced against
//! `tokio::time::timeout`. When the timeout wins, the invocation's cancellation token is
//! cancelled (so cooperative handlers can stop) and the spawned task is aborted. The
//! attempt counts as a timeout failure whether or not the handler would have finished
//! later. A panic inside the handler is caught through the `JoinError` and reported as
//! [`HandlerError::Panicked`].

use crate::error::HandlerError;
use crate::registry::{HandlerContext, TaskHandler};
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Result of a single handler invocation
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub result: Result<Value, HandlerError>,
    pub elapsed: Duration,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Executor;

impl Executor {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(
        &self,
        handler: Arc<dyn TaskHandler>,
        payload: Value,
        ctx: HandlerContext,
        timeout: Duration,
    ) -> ExecutionOutcome {
        let started = Instant::now();
        let task_id = ctx.task_id;
        let token = ctx.cancellation.clone();

        debug!(
            task_id = %task_id,
            task_type = %ctx.task_type,
            attempt = ctx.attempt,
            timeout_ms = timeout.as_millis() as u64,
            "Invoking task handler"
        );

        let mut join = tokio::spawn(async move { handler.handle(payload, ctx).await });

        let result = match tokio::time::timeout(timeout, &mut join).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(error))) if token.is_cancelled() => {
                debug!(task_id = %task_id, error = %error, "Handler stopped after cancellation");
                Err(HandlerError::Cancelled)
            }
            Ok(Ok(Err(error))) => Err(HandlerError::Failed(format!("{error:#}"))),
            Ok(Err(join_error)) if join_error.is_panic() => {
                let message = panic_message(join_error.into_panic());
                warn!(task_id = %task_id, panic = %message, "Task handler panicked");
                Err(HandlerError::Panicked(message))
            }
            Ok(Err(_)) => Err(HandlerError::Cancelled),
            Err(_) => {
                token.cancel();
                join.abort();
                warn!(
                    task_id = %task_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Task handler exceeded its timeout"
                );
                Err(HandlerError::Timeout { timeout })
            }
        };

        ExecutionOutcome {
            result,
            elapsed: started.elapsed(),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskId;
    use crate::registry::FnHandler;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn context() -> HandlerContext {
        HandlerContext {
            task_id: TaskId::new(),
            task_type: "test".to_string(),
            attempt: 1,
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_successful_invocation() {
        let handler = Arc::new(FnHandler::new(|payload: Value, _ctx: HandlerContext| async move {
            Ok(json!({ "echo": payload }))
        }));
        let outcome = Executor::new()
            .execute(handler, json!(7), context(), Duration::from_secs(1))
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.result.unwrap(), json!({ "echo": 7 }));
    }

    #[tokio::test]
    async fn test_handler_error_is_reported() {
        let handler = Arc::new(FnHandler::new(|_payload: Value, _ctx: HandlerContext| async move {
            Err(anyhow::anyhow!("smtp unavailable"))
        }));
        let outcome = Executor::new()
            .execute(handler, json!({}), context(), Duration::from_secs(1))
            .await;

        match outcome.result {
            Err(HandlerError::Failed(message)) => assert!(message.contains("smtp unavailable")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_handler_token() {
        let ctx = context();
        let token = ctx.cancellation.clone();
        let handler = Arc::new(FnHandler::new(|_payload: Value, _ctx: HandlerContext| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!(null))
        }));
        let outcome = Executor::new()
            .execute(handler, json!({}), ctx, Duration::from_millis(100))
            .await;

        assert_eq!(
            outcome.result.unwrap_err(),
            HandlerError::Timeout {
                timeout: Duration::from_millis(100)
            }
        );
        assert!(token.is_cancelled());
        assert!(outcome.elapsed >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_panic_is_caught() {
        let handler = Arc::new(FnHandler::new(|_payload: Value, _ctx: HandlerContext| async move {
            if true {
                panic!("handler blew up");
            }
            Ok(json!(null))
        }));
        let outcome = Executor::new()
            .execute(handler, json!({}), context(), Duration::from_secs(1))
            .await;

        assert_eq!(
            outcome.result.unwrap_err(),
            HandlerError::Panicked("handler blew up".to_string())
        );
    }
}
