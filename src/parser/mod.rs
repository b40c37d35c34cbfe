// ABOUTME: Parser module for YAML flow documents
// ABOUTME: Exports the typed document model and the flow loader

pub mod document;
pub mod loader;

pub use document::{FlowDocument, SchedulingConfig, TaskDocument};
pub use loader::{FlowLoader, MISSING_NAME_MESSAGE};
