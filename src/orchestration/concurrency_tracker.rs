//! # Concurrency Tracker
//!
//! Per-type counters of running tasks. A slot is taken with [`ConcurrencyTracker::try_reserve`]
//! (a single compare-and-swap loop, so two dispatchers can never both observe the last free
//! slot) and given back with [`ConcurrencyTracker::release`], exactly once per reservation.
//!
//! [`SlotGuard`] ties a reservation to a value's lifetime so the release also happens on
//! early returns and panics.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, trace};

#[derive(Debug, Default)]
pub struct ConcurrencyTracker {
    running: DashMap<String, Arc<AtomicUsize>>,
}

impl ConcurrencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, task_type: &str) -> Arc<AtomicUsize> {
        if let Some(counter) = self.running.get(task_type) {
            return counter.clone();
        }
        self.running
            .entry(task_type.to_string())
            .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
            .clone()
    }

    /// Take a slot if fewer than `limit` tasks of `task_type` are running.
    pub fn try_reserve(&self, task_type: &str, limit: usize) -> bool {
        let counter = self.counter(task_type);
        let reserved = counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < limit).then_some(current + 1)
            })
            .is_ok();

        trace!(
            task_type = %task_type,
            limit = limit,
            reserved = reserved,
            running = counter.load(Ordering::Acquire),
            "Slot reservation attempt"
        );
        reserved
    }

    /// Give back a slot taken by `try_reserve`.
    pub fn release(&self, task_type: &str) {
        let counter = self.counter(task_type);
        let released = counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            })
            .is_ok();

        if !released {
            error!(
                task_type = %task_type,
                "Concurrency slot released without a matching reservation"
            );
        }
    }

    pub fn running(&self, task_type: &str) -> usize {
        self.running
            .get(task_type)
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Free slots for `task_type` under `limit`.
    pub fn available(&self, task_type: &str, limit: usize) -> usize {
        limit.saturating_sub(self.running(task_type))
    }

    pub fn total_running(&self) -> usize {
        self.running
            .iter()
            .map(|entry| entry.value().load(Ordering::Acquire))
            .sum()
    }

    /// Reserve a slot and return a guard that releases it when dropped.
    pub fn reserve_guard(self: &Arc<Self>, task_type: &str, limit: usize) -> Option<SlotGuard> {
        self.try_reserve(task_type, limit).then(|| SlotGuard {
            tracker: Arc::clone(self),
            task_type: task_type.to_string(),
            released: false,
        })
    }
}

/// Reservation that is released exactly once: explicitly, or on drop.
#[derive(Debug)]
pub struct SlotGuard {
    tracker: Arc<ConcurrencyTracker>,
    task_type: String,
    released: bool,
}

impl SlotGuard {
    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.tracker.release(&self.task_type);
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.release_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_up_to_limit() {
        let tracker = ConcurrencyTracker::new();
        assert!(tracker.try_reserve("email", 2));
        assert!(tracker.try_reserve("email", 2));
        assert!(!tracker.try_reserve("email", 2));
        assert_eq!(tracker.running("email"), 2);
        assert_eq!(tracker.available("email", 2), 0);

        tracker.release("email");
        assert_eq!(tracker.running("email"), 1);
        assert!(tracker.try_reserve("email", 2));
    }

    #[test]
    fn test_types_are_independent() {
        let tracker = ConcurrencyTracker::new();
        assert!(tracker.try_reserve("email", 1));
        assert!(tracker.try_reserve("upload", 1));
        assert!(!tracker.try_reserve("email", 1));
        assert_eq!(tracker.total_running(), 2);
    }

    #[test]
    fn test_release_without_reservation_does_not_underflow() {
        let tracker = ConcurrencyTracker::new();
        tracker.release("email");
        assert_eq!(tracker.running("email"), 0);
    }

    #[test]
    fn test_guard_releases_once() {
        let tracker = Arc::new(ConcurrencyTracker::new());
        let guard = tracker.reserve_guard("sync", 1).unwrap();
        assert!(tracker.reserve_guard("sync", 1).is_none());
        assert_eq!(guard.task_type(), "sync");
        guard.release();
        assert_eq!(tracker.running("sync"), 0);

        {
            let _guard = tracker.reserve_guard("sync", 1).unwrap();
            assert_eq!(tracker.running("sync"), 1);
        }
        assert_eq!(tracker.running("sync"), 0);
    }

    #[test]
    fn test_concurrent_reservations_never_oversubscribe() {
        let tracker = Arc::new(ConcurrencyTracker::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    (0..1000)
                        .filter(|_| tracker.try_reserve("email", 3))
                        .count()
                })
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 3);
        assert_eq!(tracker.running("email"), 3);
    }
}
