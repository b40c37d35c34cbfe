// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides flow document builders, temp environments, and recording task behaviors

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::fs;

use taskweave::task::{Result, TaskBehavior, TaskContext, TaskError};

/// Builds flow YAML documents task by task
pub struct FlowDocumentBuilder {
    name: String,
    scheduling: Option<String>,
    tasks: Vec<TestTask>,
}

pub struct TestTask {
    pub name: String,
    pub kind: String,
    pub config: Option<String>,
    pub input: Vec<String>,
    pub on_complete: Vec<String>,
    pub on_error: Vec<String>,
}

impl TestTask {
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            config: None,
            input: Vec::new(),
            on_complete: Vec::new(),
            on_error: Vec::new(),
        }
    }

    pub fn config(mut self, yaml: &str) -> Self {
        self.config = Some(yaml.to_string());
        self
    }

    pub fn input(mut self, value: &str) -> Self {
        self.input.push(value.to_string());
        self
    }

    pub fn on_complete(mut self, targets: &[&str]) -> Self {
        self.on_complete = targets.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn on_error(mut self, targets: &[&str]) -> Self {
        self.on_error = targets.iter().map(|t| t.to_string()).collect();
        self
    }
}

impl FlowDocumentBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            scheduling: None,
            tasks: Vec::new(),
        }
    }

    pub fn with_crontab(mut self, crontab: &str) -> Self {
        self.scheduling = Some(format!("  crontab: \"{}\"\n", crontab));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.scheduling = Some("  enabled: false\n".to_string());
        self
    }

    pub fn with_task(mut self, task: TestTask) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn build_yaml(&self) -> String {
        let mut yaml = format!("name: {}\n", self.name);

        if let Some(ref scheduling) = self.scheduling {
            yaml.push_str("scheduling:\n");
            yaml.push_str(scheduling);
        }

        yaml.push_str("tasks:\n");
        for task in &self.tasks {
            yaml.push_str(&format!("  {}:\n    type: {}\n", task.name, task.kind));
            if let Some(ref config) = task.config {
                yaml.push_str("    config:\n");
                for line in config.lines() {
                    yaml.push_str(&format!("      {}\n", line));
                }
            }
            if !task.input.is_empty() {
                yaml.push_str(&format!("    input: [{}]\n", task.input.join(", ")));
            }
            if !task.on_complete.is_empty() {
                yaml.push_str(&format!("    on_complete: [{}]\n", task.on_complete.join(", ")));
            }
            if !task.on_error.is_empty() {
                yaml.push_str(&format!("    on_error: [{}]\n", task.on_error.join(", ")));
            }
        }

        yaml
    }
}

/// Temporary directory holding flow documents for a test
pub struct TestEnvironment {
    pub temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub async fn write_flow(&self, file_name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(file_name);
        fs::write(&path, content)
            .await
            .expect("Failed to write flow document");
        path
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.temp_dir.path().join(file_name)
    }
}

/// How a recording behavior finishes its work
#[derive(Debug, Clone)]
pub enum Finish {
    Output(Value),
    Nothing,
    Reject(String),
    Fail(String),
    Panic,
    Sleep(Duration),
}

/// Records each execution into a shared journal, then finishes as told
pub struct Recording {
    pub journal: Journal,
    pub finish: Finish,
}

#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: &str) {
        self.0.lock().unwrap().push(entry.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }

    pub fn behavior(&self, finish: Finish) -> Arc<dyn TaskBehavior> {
        Arc::new(Recording {
            journal: self.clone(),
            finish,
        })
    }
}

#[async_trait]
impl TaskBehavior for Recording {
    fn kind(&self) -> &str {
        "recording"
    }

    async fn on_work(&self, ctx: &TaskContext<'_>) -> Result<Option<Value>> {
        self.journal.record(ctx.name);

        match &self.finish {
            Finish::Output(value) => Ok(Some(value.clone())),
            Finish::Nothing => Ok(None),
            Finish::Reject(message) => Err(ctx.rise_validation_exception(message.clone())),
            Finish::Fail(message) => Err(TaskError::failed(ctx.name, message.clone())),
            Finish::Panic => panic!("task {} blew up", ctx.name),
            Finish::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(None)
            }
        }
    }
}
