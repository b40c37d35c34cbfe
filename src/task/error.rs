// ABOUTME: Error types raised by the task lifecycle
// ABOUTME: Separates validation failures from usage errors and hard work failures

use thiserror::Error;

use super::status::TaskStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// Raised by validation hooks or `rise_validation_exception`; routes to
    /// ERROR-outcome triggers.
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Invalid state for task '{task}' ({status}): {message}")]
    InvalidState {
        task: String,
        status: TaskStatus,
        message: String,
    },

    /// Any non-validation failure of a task's work. Aborts the flow run.
    #[error("Task execution failed: {task} - {message}")]
    Failed { task: String, message: String },
}

impl TaskError {
    pub fn validation(message: impl Into<String>) -> Self {
        TaskError::Validation {
            message: message.into(),
        }
    }

    pub fn failed(task: impl Into<String>, message: impl Into<String>) -> Self {
        TaskError::Failed {
            task: task.into(),
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, TaskError::Validation { .. })
    }

    /// Message carried by the error, without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            TaskError::Validation { message }
            | TaskError::InvalidState { message, .. }
            | TaskError::Failed { message, .. } => message,
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
