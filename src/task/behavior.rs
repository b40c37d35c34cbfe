// ABOUTME: Hook interface that concrete task variants implement
// ABOUTME: Provides the read-only context handed to hooks and the default base behavior

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::{Result, TaskError};
use crate::flow::FlowDetails;

/// Read-only view of a task handed to its lifecycle hooks.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    pub name: &'a str,
    pub flow: &'a FlowDetails,
    pub config: Option<&'a Value>,
    pub input_data: &'a [Value],
}

impl<'a> TaskContext<'a> {
    /// Deserialize the task config into a typed view. A missing config is
    /// treated as an empty mapping so all-default config types still load.
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self
            .config
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        serde_json::from_value(value).map_err(|e| {
            TaskError::validation(format!("Invalid config for task '{}': {}", self.name, e))
        })
    }

    /// Build the validation error a hook returns to reject the task.
    pub fn rise_validation_exception(&self, message: impl Into<String>) -> TaskError {
        TaskError::validation(message)
    }
}

/// Extension points woven into the task lifecycle.
///
/// Every hook has a default, so a variant only overrides what it needs. A
/// hook rejects the task by returning `TaskError::Validation`; the task then
/// moves to ERROR and the flow routes its ERROR triggers.
#[async_trait]
pub trait TaskBehavior: Send + Sync {
    /// Registry key of the variant, used in logs and reports.
    fn kind(&self) -> &str {
        "noop"
    }

    /// Called whenever a task instance is created.
    fn on_init(&self, _name: &str, _flow: &FlowDetails) {}

    /// Validate and optionally transform a config before it is stored.
    fn on_config(&self, value: Value) -> Result<Value> {
        Ok(value)
    }

    /// Transform one input contribution before it is appended.
    fn on_input(&self, value: Value) -> Value {
        value
    }

    async fn on_pre_validate(&self, _ctx: &TaskContext<'_>) -> Result<()> {
        Ok(())
    }

    /// The task's actual work. The returned value becomes the task output
    /// and the contribution delivered through COMPLETE triggers.
    async fn on_work(&self, _ctx: &TaskContext<'_>) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn on_post_validate(
        &self,
        _ctx: &TaskContext<'_>,
        _output: Option<&Value>,
    ) -> Result<()> {
        Ok(())
    }
}

/// A task with every hook left at its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseTask;

#[async_trait]
impl TaskBehavior for BaseTask {}
