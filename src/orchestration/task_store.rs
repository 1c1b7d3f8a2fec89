//! # Task Store
//!
//! In-memory record of every task keyed by [`TaskId`]. All status changes go through
//! [`TaskStore::update`], which resolves the new status with [`TaskStateMachine`] and only
//! commits the mutation when the transition is legal.
//!
//! Terminal tasks are kept for a bounded history window. Once more than `history_limit`
//! tasks have finished, the oldest finished tasks are evicted from the store entirely.

use crate::error::{Result, SchedulerError};
use crate::models::{Task, TaskId};
use crate::state_machine::{TaskEvent, TaskState, TaskStateMachine};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Result of a committed status change
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: TaskState,
    pub to: TaskState,
    pub event: TaskEvent,
    /// Task as stored after the change
    pub task: Task,
}

#[derive(Debug)]
pub struct TaskStore {
    tasks: DashMap<TaskId, Task>,
    /// Finished task ids, oldest first
    history: Mutex<VecDeque<TaskId>>,
    history_limit: usize,
}

impl TaskStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            tasks: DashMap::new(),
            history: Mutex::new(VecDeque::new()),
            history_limit: history_limit.max(1),
        }
    }

    pub fn insert(&self, task: Task) -> Result<()> {
        match self.tasks.entry(task.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(SchedulerError::Internal(format!(
                "duplicate task id {}",
                task.id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(task);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.tasks.get(id).map(|t| t.clone())
    }

    pub fn status(&self, id: &TaskId) -> Option<TaskState> {
        self.tasks.get(id).map(|t| t.status)
    }

    pub fn task_type(&self, id: &TaskId) -> Option<String> {
        self.tasks.get(id).map(|t| t.task_type.clone())
    }

    /// Apply a status change.
    ///
    /// `f` receives a working copy of the task, mutates the fields it needs and returns
    /// the event to apply. Nothing is written when the event is not legal from the task's
    /// current status.
    pub fn update<F>(&self, id: &TaskId, f: F) -> Result<Transition>
    where
        F: FnOnce(&mut Task) -> TaskEvent,
    {
        let mut entry = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| SchedulerError::task_not_found(id))?;

        let from = entry.status;
        let mut next = entry.clone();
        let event = f(&mut next);
        let to = TaskStateMachine::transition(from, &event)?;
        next.status = to;
        *entry = next.clone();
        drop(entry);

        debug!(
            task_id = %id,
            task_type = %next.task_type,
            from = %from,
            to = %to,
            event = event.event_type(),
            "Task transition"
        );

        if to.is_terminal() {
            self.record_finished(*id);
        } else if from.is_terminal() {
            self.history.lock().retain(|h| h != id);
        }

        Ok(Transition {
            from,
            to,
            event,
            task: next,
        })
    }

    fn record_finished(&self, id: TaskId) {
        let mut history = self.history.lock();
        history.push_back(id);
        while history.len() > self.history_limit {
            if let Some(evicted) = history.pop_front() {
                self.tasks.remove_if(&evicted, |_, task| task.status.is_terminal());
            }
        }
    }

    /// Most recently finished tasks, newest first.
    pub fn history(&self, limit: usize) -> Vec<Task> {
        let ids: Vec<TaskId> = self.history.lock().iter().rev().take(limit).copied().collect();
        ids.iter()
            .filter_map(|id| self.get(id))
            .filter(|task| task.status.is_terminal())
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of stored tasks per status.
    pub fn status_counts(&self) -> BTreeMap<TaskState, usize> {
        let mut counts = BTreeMap::new();
        for task in self.tasks.iter() {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        counts
    }

    /// Number of stored tasks of `task_type` in `status`.
    pub fn count_for(&self, task_type: &str, status: TaskState) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.task_type == task_type && t.status == status)
            .count()
    }
}
