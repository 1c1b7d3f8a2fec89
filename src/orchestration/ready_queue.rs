//! # Ready Queue
//!
//! Priority-ordered view over pending tasks, partitioned by task type.
//!
//! Within a type, entries are ordered by priority weight (highest first), then by creation
//! time (oldest first), then by insertion sequence. A task whose `ready_at` lies in the
//! future stays queued in its position but is skipped by [`ReadyQueue::take_eligible`]
//! until the clock passes it. That filter is the only retry timer in the system.
//!
//! Each type's partition is guarded by its own mutex, so taking, inserting and removing
//! are atomic with respect to one another and two scheduling passes can never take the
//! same entry.

use crate::models::{Task, TaskId, TaskPriority};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Sort key: priority weight desc, created_at asc, sequence asc
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueueKey {
    weight: Reverse<u8>,
    created_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadyEntry {
    pub task_id: TaskId,
    pub task_type: String,
    pub priority: TaskPriority,
    pub created_at: DateTime<Utc>,
    pub ready_at: DateTime<Utc>,
    key: QueueKey,
}

impl ReadyEntry {
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.ready_at <= now
    }
}

#[derive(Debug, Default)]
struct TypeQueue {
    entries: BTreeMap<QueueKey, ReadyEntry>,
    index: HashMap<TaskId, QueueKey>,
}

impl TypeQueue {
    fn insert(&mut self, entry: ReadyEntry) {
        if let Some(old_key) = self.index.insert(entry.task_id, entry.key) {
            self.entries.remove(&old_key);
        }
        self.entries.insert(entry.key, entry);
    }
}

#[derive(Debug, Default)]
pub struct ReadyQueue {
    queues: DashMap<String, Arc<Mutex<TypeQueue>>>,
    seq: AtomicU64,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, task_type: &str) -> Arc<Mutex<TypeQueue>> {
        if let Some(queue) = self.queues.get(task_type) {
            return queue.clone();
        }
        self.queues
            .entry(task_type.to_string())
            .or_default()
            .clone()
    }

    /// Queue a pending task. Re-enqueueing a task already present replaces its entry.
    pub fn enqueue(&self, task: &Task) {
        let key = QueueKey {
            weight: Reverse(task.priority.weight()),
            created_at: task.created_at,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        let entry = ReadyEntry {
            task_id: task.id,
            task_type: task.task_type.clone(),
            priority: task.priority,
            created_at: task.created_at,
            ready_at: task.ready_at,
            key,
        };
        self.queue(&task.task_type).lock().insert(entry);
    }

    /// Put back an entry returned by `take_eligible` in its original position.
    pub fn restore(&self, entry: ReadyEntry) {
        self.queue(&entry.task_type).lock().insert(entry);
    }

    /// Remove and return up to `max_count` entries of `task_type` whose `ready_at <= now`,
    /// in dispatch order.
    pub fn take_eligible(&self, task_type: &str, max_count: usize, now: DateTime<Utc>) -> Vec<ReadyEntry> {
        if max_count == 0 {
            return Vec::new();
        }
        let Some(queue) = self.queues.get(task_type).map(|q| q.clone()) else {
            return Vec::new();
        };

        let mut queue = queue.lock();
        let keys: Vec<QueueKey> = queue
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_ready(now))
            .take(max_count)
            .map(|(key, _)| *key)
            .collect();

        keys.into_iter()
            .filter_map(|key| {
                let entry = queue.entries.remove(&key)?;
                queue.index.remove(&entry.task_id);
                Some(entry)
            })
            .collect()
    }

    /// Remove a queued task. Returns false when it is not (or no longer) queued.
    pub fn remove(&self, task_type: &str, task_id: &TaskId) -> bool {
        let Some(queue) = self.queues.get(task_type).map(|q| q.clone()) else {
            return false;
        };
        let mut queue = queue.lock();
        match queue.index.remove(task_id) {
            Some(key) => queue.entries.remove(&key).is_some(),
            None => false,
        }
    }

    pub fn contains(&self, task_type: &str, task_id: &TaskId) -> bool {
        self.queues
            .get(task_type)
            .map(|q| q.lock().index.contains_key(task_id))
            .unwrap_or(false)
    }

    pub fn len_for(&self, task_type: &str) -> usize {
        self.queues
            .get(task_type)
            .map(|q| q.lock().entries.len())
            .unwrap_or(0)
    }

    /// Entries of `task_type` that could be dispatched at `now`.
    pub fn ready_len_for(&self, task_type: &str, now: DateTime<Utc>) -> usize {
        self.queues
            .get(task_type)
            .map(|q| q.lock().entries.values().filter(|e| e.is_ready(now)).count())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.queues.iter().map(|q| q.value().lock().entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Earliest `ready_at` among queued entries, if any.
    pub fn next_ready_at(&self) -> Option<DateTime<Utc>> {
        self.queues
            .iter()
            .filter_map(|q| q.value().lock().entries.values().map(|e| e.ready_at).min())
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(task_type: &str, priority: TaskPriority, created_at: DateTime<Utc>) -> Task {
        Task::new(task_type, json!({}), priority, 3, created_at)
    }

    #[test]
    fn test_priority_then_fifo_ordering() {
        let queue = ReadyQueue::new();
        let t0 = Utc::now();
        let low = task("email", TaskPriority::Low, t0);
        let high_late = task("email", TaskPriority::High, t0 + chrono::Duration::milliseconds(2));
        let high_early = task("email", TaskPriority::High, t0 + chrono::Duration::milliseconds(1));
        let critical = task("email", TaskPriority::Critical, t0 + chrono::Duration::milliseconds(3));

        for t in [&low, &high_late, &high_early, &critical] {
            queue.enqueue(t);
        }

        let now = t0 + chrono::Duration::seconds(1);
        let taken: Vec<TaskId> = queue
            .take_eligible("email", 10, now)
            .into_iter()
            .map(|e| e.task_id)
            .collect();
        assert_eq!(taken, vec![critical.id, high_early.id, high_late.id, low.id]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_respects_max_count_and_type() {
        let queue = ReadyQueue::new();
        let now = Utc::now();
        for _ in 0..3 {
            queue.enqueue(&task("email", TaskPriority::Medium, now));
        }
        queue.enqueue(&task("upload", TaskPriority::Medium, now));

        assert_eq!(queue.take_eligible("email", 2, now).len(), 2);
        assert_eq!(queue.len_for("email"), 1);
        assert_eq!(queue.len_for("upload"), 1);
        assert!(queue.take_eligible("email", 0, now).is_empty());
        assert!(queue.take_eligible("unknown", 5, now).is_empty());
    }

    #[test]
    fn test_future_ready_at_is_skipped_not_lost() {
        let queue = ReadyQueue::new();
        let now = Utc::now();
        let mut backing_off = task("sync", TaskPriority::Critical, now);
        backing_off.ready_at = now + chrono::Duration::seconds(30);
        let ready = task("sync", TaskPriority::Low, now);
        queue.enqueue(&backing_off);
        queue.enqueue(&ready);

        let taken = queue.take_eligible("sync", 5, now);
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].task_id, ready.id);
        assert_eq!(queue.ready_len_for("sync", now), 0);
        assert_eq!(queue.next_ready_at(), Some(backing_off.ready_at));

        let later = now + chrono::Duration::seconds(30);
        let taken = queue.take_eligible("sync", 5, later);
        assert_eq!(taken[0].task_id, backing_off.id);
    }

    #[test]
    fn test_remove_and_restore() {
        let queue = ReadyQueue::new();
        let now = Utc::now();
        let first = task("email", TaskPriority::Medium, now);
        let second = task("email", TaskPriority::Medium, now + chrono::Duration::milliseconds(1));
        queue.enqueue(&first);
        queue.enqueue(&second);

        assert!(queue.remove("email", &second.id));
        assert!(!queue.remove("email", &second.id));
        assert!(!queue.remove("upload", &first.id));

        let taken = queue.take_eligible("email", 1, now);
        assert_eq!(taken[0].task_id, first.id);
        assert!(!queue.contains("email", &first.id));

        queue.restore(taken.into_iter().next().unwrap());
        assert!(queue.contains("email", &first.id));
    }

    #[test]
    fn test_restore_keeps_original_position() {
        let queue = ReadyQueue::new();
        let now = Utc::now();
        let first = task("email", TaskPriority::High, now);
        let second = task("email", TaskPriority::High, now + chrono::Duration::milliseconds(1));
        queue.enqueue(&first);
        queue.enqueue(&second);

        let taken = queue.take_eligible("email", 1, now + chrono::Duration::seconds(1));
        queue.restore(taken.into_iter().next().unwrap());

        let order: Vec<TaskId> = queue
            .take_eligible("email", 2, now + chrono::Duration::seconds(1))
            .into_iter()
            .map(|e| e.task_id)
            .collect();
        assert_eq!(order, vec![first.id, second.id]);
    }

    #[test]
    fn test_reenqueue_replaces_entry() {
        let queue = ReadyQueue::new();
        let now = Utc::now();
        let mut t = task("email", TaskPriority::Low, now);
        queue.enqueue(&t);
        t.ready_at = now + chrono::Duration::seconds(5);
        queue.enqueue(&t);
        assert_eq!(queue.len_for("email"), 1);
        assert!(queue.take_eligible("email", 1, now).is_empty());
    }
}
