// ABOUTME: Task unit of work and its single-shot lifecycle driver
// ABOUTME: Runs the validation and work hooks and tracks status, input, and output

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::behavior::{BaseTask, TaskBehavior, TaskContext};
use super::error::{Result, TaskError};
use super::status::TaskStatus;
use crate::flow::FlowDetails;

pub struct Task {
    name: String,
    flow_details: Arc<FlowDetails>,
    behavior: Arc<dyn TaskBehavior>,
    config: Option<Value>,
    status: TaskStatus,
    input_data: Vec<Value>,
    output: Option<Value>,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a task owned by the flow identified by `flow_details`.
    pub fn new(
        name: impl Into<String>,
        flow_details: Arc<FlowDetails>,
        behavior: Arc<dyn TaskBehavior>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TaskError::validation("Task name cannot be empty"));
        }

        behavior.on_init(&name, &flow_details);

        Ok(Self {
            name,
            flow_details,
            behavior,
            config: None,
            status: TaskStatus::NotStarted,
            input_data: Vec::new(),
            output: None,
            error: None,
            started_at: None,
            finished_at: None,
        })
    }

    /// Create a task whose hooks are all defaults.
    pub fn base(name: impl Into<String>, flow_details: Arc<FlowDetails>) -> Result<Self> {
        Self::new(name, flow_details, Arc::new(BaseTask))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        self.behavior.kind()
    }

    pub fn flow_details(&self) -> &FlowDetails {
        &self.flow_details
    }

    pub fn config(&self) -> Option<&Value> {
        self.config.as_ref()
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn input_data(&self) -> &[Value] {
        &self.input_data
    }

    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Assign a config through the behavior's config hook, which may reject
    /// or transform it.
    pub fn set_config(&mut self, value: Value) -> Result<()> {
        if self.status != TaskStatus::NotStarted {
            return Err(self.invalid_state("config can only be assigned before execution"));
        }

        let value = self.behavior.on_config(value)?;
        self.config = Some(value);
        Ok(())
    }

    /// Append one input contribution through the behavior's input hook.
    pub fn append_input_data(&mut self, value: Value) -> Result<()> {
        if self.status != TaskStatus::NotStarted {
            return Err(self.invalid_state("input can only be appended before execution"));
        }

        let value = self.behavior.on_input(value);
        self.input_data.push(value);
        Ok(())
    }

    /// Drive the task through its lifecycle:
    /// pre-validate, RUNNING, work, post-validate, COMPLETED.
    ///
    /// Any hook failure moves the task to ERROR and is returned unchanged.
    /// Tasks are single-shot: executing a task that already left
    /// NOT_STARTED is an invalid-state error.
    #[instrument(skip(self), fields(task = %self.name, flow = %self.flow_details.name()))]
    pub async fn execute(&mut self) -> Result<()> {
        if self.status != TaskStatus::NotStarted {
            return Err(self.invalid_state("task has already been executed"));
        }

        let behavior = Arc::clone(&self.behavior);

        let checked = behavior.on_pre_validate(&self.context()).await;
        if let Err(e) = checked {
            return Err(self.fail(e));
        }

        self.transition(TaskStatus::Running)?;
        self.started_at = Some(Utc::now());

        let work = AssertUnwindSafe(behavior.on_work(&self.context()))
            .catch_unwind()
            .await;
        match work {
            Ok(Ok(output)) => self.output = output,
            Ok(Err(e)) => return Err(self.fail(e)),
            Err(_) => {
                let e = TaskError::failed(&self.name, "task work panicked");
                return Err(self.fail(e));
            }
        }

        let checked = behavior
            .on_post_validate(&self.context(), self.output.as_ref())
            .await;
        if let Err(e) = checked {
            return Err(self.fail(e));
        }

        self.transition(TaskStatus::Completed)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the task as ERROR and return the validation error to raise.
    ///
    /// On a task that already reached a terminal status the status is left
    /// untouched and an invalid-state error is returned instead.
    pub fn rise_validation_exception(&mut self, message: impl Into<String>) -> TaskError {
        if self.status.is_terminal() {
            return self.invalid_state("cannot raise a validation error on a finished task");
        }
        self.fail(TaskError::validation(message))
    }

    /// Fresh NOT_STARTED copy sharing name, behavior, config, and seeded input.
    pub(crate) fn instantiate(&self) -> Task {
        self.behavior.on_init(&self.name, &self.flow_details);

        Task {
            name: self.name.clone(),
            flow_details: Arc::clone(&self.flow_details),
            behavior: Arc::clone(&self.behavior),
            config: self.config.clone(),
            status: TaskStatus::NotStarted,
            input_data: self.input_data.clone(),
            output: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    fn context(&self) -> TaskContext<'_> {
        TaskContext {
            name: &self.name,
            flow: &self.flow_details,
            config: self.config.as_ref(),
            input_data: &self.input_data,
        }
    }

    fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(self.invalid_state(format!("cannot move to {}", next)));
        }
        debug!("Task {}: {} -> {}", self.name, self.status, next);
        self.status = next;
        Ok(())
    }

    fn fail(&mut self, error: TaskError) -> TaskError {
        warn!("Task {} failed: {}", self.name, error);
        self.status = TaskStatus::Error;
        self.error = Some(error.message().to_string());
        self.finished_at = Some(Utc::now());
        error
    }

    fn invalid_state(&self, message: impl Into<String>) -> TaskError {
        TaskError::InvalidState {
            task: self.name.clone(),
            status: self.status,
            message: message.into(),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("flow", &self.flow_details.name())
            .field("status", &self.status)
            .field("input_data", &self.input_data)
            .field("error", &self.error)
            .finish()
    }
}
