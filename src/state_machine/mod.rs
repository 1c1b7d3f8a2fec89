// State machine module for the task lifecycle
//
// Every status change recorded by the task store is resolved through the transition
// table in `task_state_machine`; illegal transitions are rejected rather than applied.

pub mod events;
pub mod states;
pub mod task_state_machine;

pub use events::TaskEvent;
pub use states::TaskState;
pub use task_state_machine::TaskStateMachine;
