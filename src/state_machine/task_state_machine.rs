use super::{events::TaskEvent, states::TaskState};
use crate::error::{Result, SchedulerError};

/// Transition table for the task lifecycle.
///
/// ```text
/// pending --Dispatch--> running --Complete--------> completed
///    |                     |----RetryScheduled----> pending
///    |                     `----FailPermanently---> failed --ManualRetry--> pending
///    `--Cancel--> cancelled
/// ```
pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Resolve the target state for `event`, or fail if the transition is not allowed.
    pub fn transition(current_state: TaskState, event: &TaskEvent) -> Result<TaskState> {
        let target = match (current_state, event) {
            (TaskState::Pending, TaskEvent::Dispatch) => TaskState::Running,
            (TaskState::Pending, TaskEvent::Cancel) => TaskState::Cancelled,

            (TaskState::Running, TaskEvent::Complete) => TaskState::Completed,
            (TaskState::Running, TaskEvent::RetryScheduled(_)) => TaskState::Pending,
            (TaskState::Running, TaskEvent::FailPermanently(_)) => TaskState::Failed,

            (TaskState::Failed, TaskEvent::ManualRetry) => TaskState::Pending,

            (from_state, _) => {
                return Err(SchedulerError::InvalidState(format!(
                    "cannot apply '{}' to a task in state '{from_state}'",
                    event.event_type()
                )))
            }
        };

        Ok(target)
    }

    pub fn can_transition(current_state: TaskState, event: &TaskEvent) -> bool {
        Self::transition(current_state, event).is_ok()
    }
}
