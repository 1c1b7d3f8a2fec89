//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod handlers;
pub mod strategies;

use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tasker_scheduler::orchestration::BackoffCalculator;
use tasker_scheduler::{ManualClock, TaskId, TaskQueue, TaskState};

/// Queue driven by a manual clock, with deterministic backoff.
pub fn manual_queue() -> (TaskQueue, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap(),
    ));
    let queue = TaskQueue::builder()
        .clock(clock.clone())
        .backoff(BackoffCalculator::without_jitter())
        .build()
        .expect("queue should build");
    (queue, clock)
}

/// Let spawned handlers make progress under paused tokio time.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Tick, let handlers run for `step` of tokio time and move the manual clock forward by
/// the same amount until every task in `ids` is terminal or `max_rounds` is reached.
pub async fn drive_to_completion(
    queue: &TaskQueue,
    clock: &ManualClock,
    ids: &[TaskId],
    step: Duration,
    max_rounds: usize,
) {
    for _ in 0..max_rounds {
        queue.tick();
        tokio::time::sleep(step.max(Duration::from_millis(1))).await;
        if ids.iter().all(|id| is_terminal(queue, id)) {
            return;
        }
        clock.advance(step);
    }
    panic!("tasks did not finish within {max_rounds} rounds");
}

pub fn is_terminal(queue: &TaskQueue, id: &TaskId) -> bool {
    queue
        .get_task_status(id)
        .map(|task| task.status.is_terminal())
        .unwrap_or(false)
}

pub fn status(queue: &TaskQueue, id: &TaskId) -> TaskState {
    queue.get_task_status(id).expect("task exists").status
}

pub fn payload(n: usize) -> serde_json::Value {
    json!({ "n": n })
}
