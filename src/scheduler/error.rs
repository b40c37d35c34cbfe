// ABOUTME: Error types for cron parsing and scheduled job management
// ABOUTME: Malformed cron syntax is a configuration error raised at registration time

use thiserror::Error;

use crate::flow::FlowError;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid cron expression '{expression}': {message}")]
    InvalidCron { expression: String, message: String },

    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("Scheduler has been shut down")]
    ShutDown,

    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(std::time::Duration),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl SchedulerError {
    pub fn is_configuration(&self) -> bool {
        match self {
            SchedulerError::InvalidCron { .. } => true,
            SchedulerError::Flow(e) => e.is_configuration(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
