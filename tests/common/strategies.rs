//! Proptest strategies for scheduler inputs.

use proptest::prelude::*;
use std::time::Duration;
use tasker_scheduler::{TaskPriority, TypePolicy};

pub fn priority_strategy() -> impl Strategy<Value = TaskPriority> {
    prop_oneof![
        Just(TaskPriority::Critical),
        Just(TaskPriority::High),
        Just(TaskPriority::Medium),
        Just(TaskPriority::Low),
    ]
}

/// Valid policies: base delay never above the cap.
pub fn policy_strategy() -> impl Strategy<Value = TypePolicy> {
    (1usize..16, 1u64..60_000, 0u32..10, 1u64..10_000, 0u64..600_000).prop_map(
        |(concurrency, timeout_ms, max_retries, base_ms, extra_ms)| {
            TypePolicy::new(concurrency, Duration::from_millis(timeout_ms), max_retries)
                .with_retry_delays(
                    Duration::from_millis(base_ms),
                    Duration::from_millis(base_ms + extra_ms),
                )
        },
    )
}
