// ABOUTME: Typed view of a YAML flow document
// ABOUTME: Declares the optional scheduling block and the task and trigger sections

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::flow::OverlapPolicy;

fn default_enabled() -> bool {
    true
}

fn default_kind() -> String {
    "noop".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDocument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub scheduling: Option<SchedulingConfig>,
    #[serde(default)]
    pub tasks: IndexMap<String, TaskDocument>,
}

/// Scheduling block of a flow document.
///
/// A missing `crontab` means the flow is run once, immediately, when it is
/// registered with the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub crontab: Option<String>,
    #[serde(default)]
    pub overlap: OverlapPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDocument {
    /// Behavior registry key
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Option<serde_yaml::Value>,
    /// Input contributions seeded before every run
    #[serde(default)]
    pub input: Vec<serde_yaml::Value>,
    #[serde(default)]
    pub on_complete: Vec<String>,
    #[serde(default)]
    pub on_error: Vec<String>,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            crontab: None,
            overlap: OverlapPolicy::Queue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let yaml = r#"
name: usersUsageFlow
scheduling:
  crontab: "0 3 * * *"
tasks:
  fetch: {}
"#;
        let document: FlowDocument = serde_yaml::from_str(yaml).unwrap();

        let scheduling = document.scheduling.unwrap();
        assert!(scheduling.enabled);
        assert_eq!(scheduling.overlap, OverlapPolicy::Queue);

        let fetch = &document.tasks["fetch"];
        assert_eq!(fetch.kind, "noop");
        assert!(fetch.config.is_none());
        assert!(fetch.on_complete.is_empty());
    }

    #[test]
    fn test_full_task_section() {
        let yaml = r#"
name: report
scheduling:
  enabled: false
  overlap: reject
tasks:
  fetch:
    type: command
    config:
      command: echo
      args: ["hello"]
    on_complete: [aggregate]
    on_error: [alert, audit]
  aggregate:
    type: passthrough
    input: ["seed"]
"#;
        let document: FlowDocument = serde_yaml::from_str(yaml).unwrap();

        let scheduling = document.scheduling.unwrap();
        assert!(!scheduling.enabled);
        assert_eq!(scheduling.overlap, OverlapPolicy::Reject);

        let names: Vec<&String> = document.tasks.keys().collect();
        assert_eq!(names, vec!["fetch", "aggregate"]);
        assert_eq!(document.tasks["fetch"].on_error, vec!["alert", "audit"]);
        assert_eq!(document.tasks["aggregate"].input.len(), 1);
    }
}
