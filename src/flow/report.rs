// ABOUTME: Per-run report of final task statuses
// ABOUTME: Lets callers tell a flow with failed tasks apart from a flow that failed to run

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::task::{Task, TaskStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub status: TaskStatus,
    /// Set when every incoming trigger resolved without firing
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub input_data: Vec<Value>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub flow: String,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tasks: IndexMap<String, TaskReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub errored: usize,
    pub skipped: usize,
    pub not_started: usize,
}

impl TaskReport {
    pub fn from_task(task: &Task, skipped: bool) -> Self {
        Self {
            status: task.status(),
            skipped,
            input_data: task.input_data().to_vec(),
            output: task.output().cloned(),
            error: task.error().map(str::to_string),
            started_at: task.started_at(),
            finished_at: task.finished_at(),
        }
    }
}

impl RunReport {
    pub fn status(&self, task: &str) -> Option<TaskStatus> {
        self.tasks.get(task).map(|t| t.status)
    }

    pub fn task(&self, task: &str) -> Option<&TaskReport> {
        self.tasks.get(task)
    }

    /// Task name to final status, in the order tasks were added
    pub fn statuses(&self) -> IndexMap<String, TaskStatus> {
        self.tasks
            .iter()
            .map(|(name, report)| (name.clone(), report.status))
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.tasks.values().any(|t| t.status == TaskStatus::Error)
    }

    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|(_, t)| t.status == status)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn summary(&self) -> RunSummary {
        let count = |status| self.tasks.values().filter(|t| t.status == status).count();
        RunSummary {
            total: self.tasks.len(),
            completed: count(TaskStatus::Completed),
            errored: count(TaskStatus::Error),
            skipped: self.tasks.values().filter(|t| t.skipped).count(),
            not_started: count(TaskStatus::NotStarted),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tasks: {} completed, {} error, {} skipped, {} not started",
            self.total, self.completed, self.errored, self.skipped, self.not_started
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: TaskStatus, skipped: bool) -> TaskReport {
        TaskReport {
            status,
            skipped,
            input_data: Vec::new(),
            output: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn test_summary_counts() {
        let mut tasks = IndexMap::new();
        tasks.insert("a".to_string(), entry(TaskStatus::Completed, false));
        tasks.insert("b".to_string(), entry(TaskStatus::Error, false));
        tasks.insert("c".to_string(), entry(TaskStatus::NotStarted, true));

        let report = RunReport {
            flow: "flow1".to_string(),
            run_id: "run".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            tasks,
        };

        let summary = report.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.not_started, 1);
        assert!(report.has_errors());
        assert_eq!(report.tasks_with_status(TaskStatus::Error), vec!["b"]);
        assert_eq!(report.statuses().keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(
            summary.to_string(),
            "3 tasks: 1 completed, 1 error, 1 skipped, 1 not started"
        );
    }
}
