// ABOUTME: Task module for the orchestration core
// ABOUTME: Exports the task lifecycle, hook interface, status model, and trigger edges

pub mod behavior;
pub mod error;
pub mod status;
pub mod task;
pub mod trigger;

pub use behavior::{BaseTask, TaskBehavior, TaskContext};
pub use error::{Result, TaskError};
pub use status::TaskStatus;
pub use task::Task;
pub use trigger::{Outcome, Trigger, TriggerCallback, TriggerEvent, TriggerTarget};
