// ABOUTME: Error taxonomy for flow assembly, loading, and execution
// ABOUTME: Distinguishes configuration problems from usage errors and aborted runs

use std::path::PathBuf;
use thiserror::Error;

use crate::task::TaskError;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Task not found: {task}")]
    TaskNotFound { task: String },

    #[error("Task '{task}' aborted the run: {source}")]
    TaskAborted {
        task: String,
        #[source]
        source: TaskError,
    },

    #[error("Flow '{flow}' is already running")]
    RunInProgress { flow: String },

    #[error("Flow run cancelled: {flow}")]
    Cancelled { flow: String },

    #[error(transparent)]
    Task(#[from] TaskError),
}

impl FlowError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, FlowError::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
