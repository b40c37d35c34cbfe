// ABOUTME: Trigger edges that connect a task outcome to a successor
// ABOUTME: Targets are either another task in the flow or an external callback

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::status::TaskStatus;

/// Terminal disposition of a task execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Complete,
    Error,
}

impl Outcome {
    /// Outcome of a task in `status`, if that status is terminal.
    pub fn from_status(status: TaskStatus) -> Option<Self> {
        match status {
            TaskStatus::Completed => Some(Outcome::Complete),
            TaskStatus::Error => Some(Outcome::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Complete => write!(f, "COMPLETE"),
            Outcome::Error => write!(f, "ERROR"),
        }
    }
}

/// Delivered to callback targets when their trigger fires.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerEvent {
    pub flow: String,
    pub source: String,
    pub outcome: Outcome,
    pub contribution: Value,
}

pub type TriggerCallback = Arc<dyn Fn(&TriggerEvent) + Send + Sync>;

#[derive(Clone)]
pub enum TriggerTarget {
    Task(String),
    Callback(TriggerCallback),
}

impl TriggerTarget {
    pub fn task_name(&self) -> Option<&str> {
        match self {
            TriggerTarget::Task(name) => Some(name),
            TriggerTarget::Callback(_) => None,
        }
    }
}

impl PartialEq for TriggerTarget {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TriggerTarget::Task(a), TriggerTarget::Task(b)) => a == b,
            (TriggerTarget::Callback(a), TriggerTarget::Callback(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for TriggerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerTarget::Task(name) => f.debug_tuple("Task").field(name).finish(),
            TriggerTarget::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// "When the source task finishes with `on`, deliver a contribution to
/// `target` and invoke it." The source is implied by the flow edge owning
/// the trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    on: Outcome,
    target: TriggerTarget,
}

impl Trigger {
    pub fn new(on: Outcome, target: TriggerTarget) -> Self {
        Self { on, target }
    }

    pub fn on_complete(task: impl Into<String>) -> Self {
        Self::new(Outcome::Complete, TriggerTarget::Task(task.into()))
    }

    pub fn on_error(task: impl Into<String>) -> Self {
        Self::new(Outcome::Error, TriggerTarget::Task(task.into()))
    }

    pub fn callback<F>(on: Outcome, callback: F) -> Self
    where
        F: Fn(&TriggerEvent) + Send + Sync + 'static,
    {
        Self::new(on, TriggerTarget::Callback(Arc::new(callback)))
    }

    pub fn on(&self) -> Outcome {
        self.on
    }

    pub fn target(&self) -> &TriggerTarget {
        &self.target
    }

    pub fn matches(&self, outcome: Outcome) -> bool {
        self.on == outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_equality_by_outcome_and_target() {
        assert_eq!(Trigger::on_complete("b"), Trigger::on_complete("b"));
        assert_ne!(Trigger::on_complete("b"), Trigger::on_error("b"));
        assert_ne!(Trigger::on_complete("b"), Trigger::on_complete("c"));
    }

    #[test]
    fn test_callback_equality_is_identity() {
        let callback: TriggerCallback = Arc::new(|_event: &TriggerEvent| {});
        let a = Trigger::new(Outcome::Error, TriggerTarget::Callback(callback.clone()));
        let b = Trigger::new(Outcome::Error, TriggerTarget::Callback(callback));
        let c = Trigger::callback(Outcome::Error, |_event| {});

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(c.target().task_name(), None);
    }

    #[test]
    fn test_outcome_from_status() {
        assert_eq!(
            Outcome::from_status(TaskStatus::Completed),
            Some(Outcome::Complete)
        );
        assert_eq!(Outcome::from_status(TaskStatus::Error), Some(Outcome::Error));
        assert_eq!(Outcome::from_status(TaskStatus::Running), None);
    }
}
