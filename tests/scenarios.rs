//! End-to-end scheduling scenarios: priority order, retry to success, retry exhaustion
//! and manual retry, the concurrency limit under load, and cancelling a running task.

mod common;

use common::handlers::{FlakyHandler, GaugeHandler, RecordingHandler};
use common::*;
use serde_json::json;
use std::time::Duration;
use tasker_scheduler::{Clock, TaskPriority, TaskState, TypePolicy};

#[tokio::test(start_paused = true)]
async fn high_priority_runs_before_low_priority() {
    let (queue, _clock) = manual_queue();
    let handler = RecordingHandler::with_delay(Duration::from_millis(10));
    queue
        .register_type(
            "email",
            TypePolicy::new(1, Duration::from_secs(5), 0),
            handler.clone(),
        )
        .unwrap();

    let low = queue
        .add_task("email", json!({ "to": "p2" }), TaskPriority::Low)
        .unwrap();
    let high = queue
        .add_task("email", json!({ "to": "p1" }), TaskPriority::High)
        .unwrap();

    assert_eq!(queue.tick(), 1);
    assert_eq!(status(&queue, &high), TaskState::Running);
    assert_eq!(status(&queue, &low), TaskState::Pending);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(queue.tick(), 1);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(handler.calls(), vec![json!({ "to": "p1" }), json!({ "to": "p2" })]);
    assert_eq!(status(&queue, &high), TaskState::Completed);
    assert_eq!(status(&queue, &low), TaskState::Completed);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_until_success() {
    let (queue, clock) = manual_queue();
    let handler = FlakyHandler::failing(2);
    queue
        .register_type(
            "sync",
            TypePolicy::new(1, Duration::from_secs(5), 3).with_retry_delays(
                Duration::from_millis(100),
                Duration::from_secs(10),
            ),
            handler.clone(),
        )
        .unwrap();

    let id = queue.add_task("sync", json!({}), TaskPriority::Medium).unwrap();
    drive_to_completion(&queue, &clock, &[id], Duration::from_millis(100), 20).await;

    let task = queue.get_task_status(&id).unwrap();
    assert_eq!(task.status, TaskState::Completed);
    assert_eq!(task.retry_count, 2);
    assert_eq!(task.result, Some(json!({ "succeeded_on": 3 })));
    assert_eq!(handler.invocations(), 3);

    let metrics = queue.get_metrics();
    assert_eq!(metrics.completed_tasks, 1);
    assert_eq!(metrics.total_retries, 2);
    assert_eq!(metrics.error_rate, 0.0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_and_manual_retry_starts_fresh_cycle() {
    let (queue, clock) = manual_queue();
    let handler = FlakyHandler::always_failing();
    queue
        .register_type(
            "upload",
            TypePolicy::new(1, Duration::from_secs(5), 2).with_retry_delays(
                Duration::from_millis(50),
                Duration::from_secs(1),
            ),
            handler.clone(),
        )
        .unwrap();

    let id = queue.add_task("upload", json!({}), TaskPriority::High).unwrap();
    drive_to_completion(&queue, &clock, &[id], Duration::from_millis(50), 20).await;

    let task = queue.get_task_status(&id).unwrap();
    assert_eq!(task.status, TaskState::Failed);
    assert_eq!(handler.invocations(), 3);
    assert_eq!(task.retry_count, 2);
    assert!(task
        .last_error
        .as_deref()
        .unwrap()
        .contains("transient failure on invocation 3"));
    assert_eq!(task.error_kind.as_deref(), Some("HANDLER_ERROR"));
    assert_eq!(queue.get_task_history(5)[0].id, id);

    assert!(queue.retry_task(&id).unwrap());
    let task = queue.get_task_status(&id).unwrap();
    assert_eq!(task.status, TaskState::Pending);
    assert_eq!(task.retry_count, 0);
    assert!(task.last_error.is_none());
    assert_eq!(task.ready_at, clock.now());
    assert!(queue.get_task_history(5).is_empty());

    drive_to_completion(&queue, &clock, &[id], Duration::from_millis(50), 20).await;
    assert_eq!(status(&queue, &id), TaskState::Failed);
    assert_eq!(handler.invocations(), 6);
    assert!(!queue.cancel_task(&id).unwrap());
}

#[tokio::test(start_paused = true)]
async fn concurrency_limit_holds_under_load() {
    let (queue, clock) = manual_queue();
    let handler = GaugeHandler::new(Duration::from_millis(30));
    queue
        .register_type(
            "x",
            TypePolicy::new(2, Duration::from_secs(5), 0),
            handler.clone(),
        )
        .unwrap();

    let ids: Vec<_> = (0..5)
        .map(|n| queue.add_task("x", payload(n), TaskPriority::Medium).unwrap())
        .collect();

    for _ in 0..50 {
        queue.tick();
        queue.tick();
        let running = queue.get_queue_stats().for_type("x").unwrap().running;
        assert!(running <= 2, "running {running} exceeds concurrency");
        tokio::time::sleep(Duration::from_millis(5)).await;
        clock.advance(Duration::from_millis(5));
        if ids.iter().all(|id| is_terminal(&queue, id)) {
            break;
        }
    }

    assert!(ids.iter().all(|id| status(&queue, id) == TaskState::Completed));
    assert_eq!(handler.peak(), 2);
    assert_eq!(queue.get_metrics().running_tasks, 0);
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_running_task_is_rejected() {
    let (queue, _clock) = manual_queue();
    let handler = RecordingHandler::with_delay(Duration::from_millis(50));
    queue
        .register_type(
            "report",
            TypePolicy::new(1, Duration::from_secs(5), 0),
            handler.clone(),
        )
        .unwrap();

    let id = queue.add_task("report", json!({}), TaskPriority::Medium).unwrap();
    assert_eq!(queue.tick(), 1);
    assert_eq!(status(&queue, &id), TaskState::Running);

    assert!(!queue.cancel_task(&id).unwrap());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(status(&queue, &id), TaskState::Completed);
    assert_eq!(handler.calls().len(), 1);
    assert_eq!(queue.get_metrics().cancelled_tasks, 0);
}
