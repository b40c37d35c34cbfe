// ABOUTME: Task status enumeration and the forward-only transition rules
// ABOUTME: Shared by the task lifecycle driver and the per-run flow report

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a single task.
///
/// | Status        | Meaning                                                  |
/// |---------------|----------------------------------------------------------|
/// | `NotStarted`  | The task has not started yet                             |
/// | `Running`     | The task is executing its work                           |
/// | `Completed`   | The task finished its work and passed validation         |
/// | `Error`       | Validation rejected the task or its work failed          |
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    Running,
    Completed,
    Error,
}

impl TaskStatus {
    /// Terminal statuses are final; a task never leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }

    /// Check whether moving from `self` to `next` is allowed.
    ///
    /// `NotStarted -> Error` is only reachable when a task is rejected before
    /// its work starts (pre-validation or an explicit validation failure).
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::NotStarted, TaskStatus::Running)
                | (TaskStatus::NotStarted, TaskStatus::Error)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Error)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "NOT_STARTED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
