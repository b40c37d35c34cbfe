// ABOUTME: Main library module for the taskweave flow engine
// ABOUTME: Exports all core modules and provides the public API

pub mod cli;
pub mod flow;
pub mod parser;
pub mod scheduler;
pub mod task;
pub mod tasks;

// Re-export commonly used types
pub use flow::{CancelHandle, Flow, FlowDetails, FlowError, OverlapPolicy, RunReport};
pub use parser::FlowLoader;
pub use scheduler::{SchedulerBinding, SchedulerConfig, SchedulerError};
pub use task::{BaseTask, Task, TaskBehavior, TaskContext, TaskError, TaskStatus, Trigger};
pub use tasks::BehaviorRegistry;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
