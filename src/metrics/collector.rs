//! # Queue Metrics
//!
//! Aggregates operational statistics for the scheduler: task counts by lifecycle stage,
//! rolling per-type processing times, completion throughput over a sliding window, and
//! the error rate of terminal outcomes.
//!
//! The collector only observes. Snapshots never touch task state, and recording never
//! blocks dispatch for longer than a short mutex hold.

use crate::constants::system;
use crate::state_machine::TaskState;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Point-in-time view of the whole queue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueMetrics {
    pub collected_at: DateTime<Utc>,
    pub uptime_seconds: u64,

    /// Tasks accepted by `add_task`
    pub total_tasks: u64,
    /// Tasks currently waiting (including those backing off)
    pub pending_tasks: u64,
    /// Tasks currently executing
    pub running_tasks: u64,
    /// Terminal successes
    pub completed_tasks: u64,
    /// Tasks currently failed (retries exhausted and not manually retried)
    pub failed_tasks: u64,
    pub cancelled_tasks: u64,

    /// Retries granted by the backoff manager
    pub total_retries: u64,
    /// Handler invocations that exceeded their timeout
    pub total_timeouts: u64,
    /// Every permanent failure ever recorded, including tasks later retried by hand
    pub total_permanent_failures: u64,
    /// Failed invocations grouped by error kind
    pub error_counts: BTreeMap<String, u64>,

    /// Mean processing time over the recent samples of every type
    pub avg_processing_time_ms: f64,
    /// Successful completions per second over the throughput window
    pub throughput_per_second: f64,
    pub throughput_window_seconds: u64,
    /// failed / (failed + completed); 0.0 before any terminal outcome
    pub error_rate: f64,
}

/// Per-type execution statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TypeMetrics {
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub timed_out: u64,
    /// Handler invocations observed, successful or not
    pub invocations: u64,
    /// Rolling mean over the most recent invocations
    pub avg_processing_time_ms: f64,
    pub max_processing_time_ms: u64,
}

#[derive(Debug, Default)]
struct TypeStats {
    completed: u64,
    failed: u64,
    retried: u64,
    timed_out: u64,
    invocations: u64,
    samples_ms: VecDeque<u64>,
}

impl TypeStats {
    fn record_sample(&mut self, elapsed: Duration) {
        self.invocations += 1;
        if self.samples_ms.len() == system::LATENCY_SAMPLE_SIZE {
            self.samples_ms.pop_front();
        }
        self.samples_ms
            .push_back(elapsed.as_millis().min(u64::MAX as u128) as u64);
    }

    fn avg_ms(&self) -> f64 {
        if self.samples_ms.is_empty() {
            0.0
        } else {
            self.samples_ms.iter().sum::<u64>() as f64 / self.samples_ms.len() as f64
        }
    }

    fn to_metrics(&self) -> TypeMetrics {
        TypeMetrics {
            completed: self.completed,
            failed: self.failed,
            retried: self.retried,
            timed_out: self.timed_out,
            invocations: self.invocations,
            avg_processing_time_ms: self.avg_ms(),
            max_processing_time_ms: self.samples_ms.iter().copied().max().unwrap_or(0),
        }
    }
}

/// Outcome of one handler invocation, as seen by the metrics collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
    TimedOut,
}

#[derive(Debug)]
pub struct MetricsCollector {
    started_at: DateTime<Utc>,
    window: Duration,

    total: AtomicU64,
    pending: AtomicU64,
    running: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    retries: AtomicU64,
    timeouts: AtomicU64,
    permanent_failures: AtomicU64,

    error_counts: Mutex<HashMap<String, u64>>,
    per_type: Mutex<HashMap<String, TypeStats>>,
    completions: Mutex<VecDeque<DateTime<Utc>>>,
}

impl MetricsCollector {
    pub fn new(started_at: DateTime<Utc>, window: Duration) -> Self {
        Self {
            started_at,
            window,
            total: AtomicU64::new(0),
            pending: AtomicU64::new(0),
            running: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            permanent_failures: AtomicU64::new(0),
            error_counts: Mutex::new(HashMap::new()),
            per_type: Mutex::new(HashMap::new()),
            completions: Mutex::new(VecDeque::new()),
        }
    }

    /// A task entered the queue through `add_task`.
    pub fn record_created(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    /// Mirror a task store transition into the stage counters.
    pub fn record_transition(&self, from: TaskState, to: TaskState) {
        if from == to {
            return;
        }
        match from {
            TaskState::Pending => decrement(&self.pending),
            TaskState::Running => decrement(&self.running),
            TaskState::Failed => decrement(&self.failed),
            TaskState::Completed | TaskState::Cancelled => {}
        }
        match to {
            TaskState::Pending => self.pending.fetch_add(1, Ordering::Relaxed),
            TaskState::Running => self.running.fetch_add(1, Ordering::Relaxed),
            TaskState::Completed => self.completed.fetch_add(1, Ordering::Relaxed),
            TaskState::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
            TaskState::Cancelled => self.cancelled.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Record the timing and outcome of one handler invocation.
    pub fn record_attempt(
        &self,
        task_type: &str,
        elapsed: Duration,
        outcome: AttemptOutcome,
        error_kind: Option<&str>,
    ) {
        if outcome == AttemptOutcome::TimedOut {
            self.timeouts.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(kind) = error_kind {
            *self.error_counts.lock().entry(kind.to_string()).or_insert(0) += 1;
        }

        let mut per_type = self.per_type.lock();
        let stats = per_type.entry(task_type.to_string()).or_default();
        stats.record_sample(elapsed);
        if outcome == AttemptOutcome::TimedOut {
            stats.timed_out += 1;
        }
    }

    pub fn record_completed(&self, task_type: &str, at: DateTime<Utc>) {
        self.per_type
            .lock()
            .entry(task_type.to_string())
            .or_default()
            .completed += 1;

        let mut completions = self.completions.lock();
        completions.push_back(at);
        self.prune_completions(&mut completions, at);
    }

    pub fn record_failed(&self, task_type: &str) {
        self.permanent_failures.fetch_add(1, Ordering::Relaxed);
        self.per_type
            .lock()
            .entry(task_type.to_string())
            .or_default()
            .failed += 1;
    }

    pub fn record_retry(&self, task_type: &str) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        self.per_type
            .lock()
            .entry(task_type.to_string())
            .or_default()
            .retried += 1;
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> QueueMetrics {
        let completed = self.completed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let error_rate = if completed + failed > 0 {
            failed as f64 / (completed + failed) as f64
        } else {
            0.0
        };

        let avg_processing_time_ms = {
            let per_type = self.per_type.lock();
            let (sum, count) = per_type.values().fold((0u64, 0usize), |(sum, count), stats| {
                (
                    sum + stats.samples_ms.iter().sum::<u64>(),
                    count + stats.samples_ms.len(),
                )
            });
            if count > 0 {
                sum as f64 / count as f64
            } else {
                0.0
            }
        };

        let window_secs = self.window.as_secs_f64().max(f64::EPSILON);
        let cutoff = now - chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::zero());
        let recent = self
            .completions
            .lock()
            .iter()
            .filter(|at| **at > cutoff && **at <= now)
            .count();

        QueueMetrics {
            collected_at: now,
            uptime_seconds: (now - self.started_at).num_seconds().max(0) as u64,
            total_tasks: self.total.load(Ordering::Relaxed),
            pending_tasks: self.pending.load(Ordering::Relaxed),
            running_tasks: self.running.load(Ordering::Relaxed),
            completed_tasks: completed,
            failed_tasks: failed,
            cancelled_tasks: self.cancelled.load(Ordering::Relaxed),
            total_retries: self.retries.load(Ordering::Relaxed),
            total_timeouts: self.timeouts.load(Ordering::Relaxed),
            total_permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
            error_counts: self
                .error_counts
                .lock()
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            avg_processing_time_ms,
            throughput_per_second: recent as f64 / window_secs,
            throughput_window_seconds: self.window.as_secs(),
            error_rate,
        }
    }

    pub fn type_metrics(&self, task_type: &str) -> TypeMetrics {
        self.per_type
            .lock()
            .get(task_type)
            .map(TypeStats::to_metrics)
            .unwrap_or_default()
    }

    fn prune_completions(&self, completions: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::zero());
        while completions.front().is_some_and(|at| *at <= cutoff)
            || completions.len() > system::MAX_THROUGHPUT_SAMPLES
        {
            completions.pop_front();
        }
    }
}

fn decrement(counter: &AtomicU64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
}
