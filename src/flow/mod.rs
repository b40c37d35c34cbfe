// ABOUTME: Flow module for the orchestration core
// ABOUTME: Exports flow assembly, trigger graph analysis, run reports, and flow errors

pub mod details;
pub mod error;
pub mod flow;
pub mod graph;
pub mod report;
mod run;

pub use details::FlowDetails;
pub use error::{FlowError, Result};
pub use flow::{CancelHandle, Edge, Flow, OverlapPolicy};
pub use graph::TriggerGraph;
pub use report::{RunReport, RunSummary, TaskReport};
