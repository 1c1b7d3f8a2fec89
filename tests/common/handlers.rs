//! Test handlers that record what they were asked to do.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tasker_scheduler::{HandlerContext, TaskHandler};

/// Records the payload of every invocation, in call order.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub calls: Mutex<Vec<Value>>,
    pub delay: Duration,
}

impl RecordingHandler {
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            delay,
        })
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TaskHandler for RecordingHandler {
    async fn handle(&self, payload: Value, _ctx: HandlerContext) -> anyhow::Result<Value> {
        self.calls.lock().push(payload.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(json!({ "handled": payload }))
    }
}

/// Fails the first `failures` invocations, then succeeds.
#[derive(Debug)]
pub struct FlakyHandler {
    failures: usize,
    pub invocations: AtomicUsize,
}

impl FlakyHandler {
    pub fn failing(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            invocations: AtomicUsize::new(0),
        })
    }

    pub fn always_failing() -> Arc<Self> {
        Self::failing(usize::MAX)
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for FlakyHandler {
    async fn handle(&self, _payload: Value, ctx: HandlerContext) -> anyhow::Result<Value> {
        let n = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            anyhow::bail!("transient failure on invocation {n} (attempt {})", ctx.attempt);
        }
        Ok(json!({ "succeeded_on": n }))
    }
}

/// Tracks the highest number of simultaneous invocations.
#[derive(Debug, Default)]
pub struct GaugeHandler {
    current: AtomicUsize,
    pub peak: AtomicUsize,
    pub completed: AtomicUsize,
    pub work: Duration,
}

impl GaugeHandler {
    pub fn new(work: Duration) -> Arc<Self> {
        Arc::new(Self {
            work,
            ..Default::default()
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for GaugeHandler {
    async fn handle(&self, _payload: Value, _ctx: HandlerContext) -> anyhow::Result<Value> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.work).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Null)
    }
}

/// Sleeps far past any reasonable timeout unless cancelled.
#[derive(Debug, Default)]
pub struct StuckHandler {
    pub cancelled: AtomicUsize,
}

#[async_trait]
impl TaskHandler for StuckHandler {
    async fn handle(&self, _payload: Value, ctx: HandlerContext) -> anyhow::Result<Value> {
        tokio::select! {
            _ = ctx.cancellation.cancelled() => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("cancelled")
            }
            _ = tokio::time::sleep(Duration::from_secs(3600)) => Ok(Value::Null),
        }
    }
}
