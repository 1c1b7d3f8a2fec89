mod common;

use chrono::{TimeZone, Utc};
use common::strategies::*;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tasker_scheduler::orchestration::{BackoffCalculator, ConcurrencyTracker, ReadyQueue};
use tasker_scheduler::{Task, TaskPriority};

proptest! {
    /// Property: retry delays never decrease as the retry count grows, with jitter on
    #[test]
    fn backoff_is_non_decreasing(policy in policy_strategy(), retries in 1u32..40) {
        let calculator = BackoffCalculator::default();
        let mut previous = std::time::Duration::ZERO;
        for retry in 1..=retries {
            let delay = calculator.delay_for(retry, &policy).delay;
            prop_assert!(delay >= previous, "retry {} delay {:?} < {:?}", retry, delay, previous);
            prop_assert!(delay <= policy.retry_delay_max);
            previous = delay;
        }
    }

    /// Property: the jitter-free delay is the exponential curve clamped to the cap
    #[test]
    fn base_delay_matches_formula(policy in policy_strategy(), retry in 1u32..20) {
        let calculator = BackoffCalculator::without_jitter();
        let expected = policy
            .retry_delay_base
            .saturating_mul(1u32 << (retry - 1))
            .min(policy.retry_delay_max);
        prop_assert_eq!(calculator.base_delay_for(retry, &policy), expected);
        prop_assert_eq!(calculator.delay_for(retry, &policy).delay, expected);
    }

    /// Property: reservations never exceed the limit, whatever the interleaving
    #[test]
    fn concurrency_tracker_never_oversubscribes(
        limit in 1usize..8,
        ops in prop::collection::vec(any::<bool>(), 1..200),
    ) {
        let tracker = ConcurrencyTracker::new();
        let mut held = 0usize;
        for reserve in ops {
            if reserve {
                if tracker.try_reserve("t", limit) {
                    held += 1;
                }
            } else if held > 0 {
                tracker.release("t");
                held -= 1;
            }
            prop_assert!(tracker.running("t") <= limit);
            prop_assert_eq!(tracker.running("t"), held);
        }
    }

    /// Property: eligible entries come out by priority weight, then creation time
    #[test]
    fn ready_queue_dispatch_order(
        tasks in prop::collection::vec((priority_strategy(), 0i64..1_000), 1..50),
    ) {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let queue = ReadyQueue::new();
        for (priority, offset_ms) in &tasks {
            let created = base + chrono::Duration::milliseconds(*offset_ms);
            let task = Task::new("t", json!({}), *priority, 0, created);
            queue.enqueue(&task);
        }

        let now = base + chrono::Duration::seconds(5);
        let taken = queue.take_eligible("t", tasks.len(), now);
        prop_assert_eq!(taken.len(), tasks.len());
        for pair in taken.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(
                a.priority.weight() > b.priority.weight()
                    || (a.priority == b.priority && a.created_at <= b.created_at),
                "{:?} dispatched before {:?}", a, b
            );
        }
        prop_assert!(queue.is_empty());
    }
}

/// Many threads racing for the last slots never push the count past the limit.
#[test]
fn concurrent_reservations_respect_limit() {
    let tracker = Arc::new(ConcurrencyTracker::new());
    let limit = 3;
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let tracker = tracker.clone();
            std::thread::spawn(move || {
                let mut granted = 0;
                for _ in 0..1_000 {
                    if let Some(guard) = tracker.reserve_guard("shared", limit) {
                        assert!(tracker.running("shared") <= limit);
                        granted += 1;
                        drop(guard);
                    }
                }
                granted
            })
        })
        .collect();

    let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(granted > 0);
    assert_eq!(tracker.running("shared"), 0);
}

#[test]
fn priorities_order_by_weight() {
    let mut priorities = vec![
        TaskPriority::Low,
        TaskPriority::Critical,
        TaskPriority::Medium,
        TaskPriority::High,
    ];
    priorities.sort_by_key(|p| std::cmp::Reverse(p.weight()));
    assert_eq!(
        priorities,
        vec![
            TaskPriority::Critical,
            TaskPriority::High,
            TaskPriority::Medium,
            TaskPriority::Low
        ]
    );
}
