// ABOUTME: Builds flows from YAML configuration documents
// ABOUTME: Maps missing files and malformed documents onto the flow error contract

use serde_yaml::Value;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use super::document::FlowDocument;
use crate::flow::{Flow, FlowError, Result};
use crate::task::Trigger;
use crate::tasks::BehaviorRegistry;

pub const MISSING_NAME_MESSAGE: &str = "Flow name is missing in YAML config";

pub struct FlowLoader {
    registry: BehaviorRegistry,
}

impl FlowLoader {
    pub fn new(registry: BehaviorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BehaviorRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut BehaviorRegistry {
        &mut self.registry
    }

    /// Load a flow from a YAML file
    pub async fn load<P: AsRef<Path>>(&self, path: P) -> Result<Flow> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            debug!("Failed to open flow document {}: {}", path.display(), e);
            FlowError::ConfigFileNotFound {
                path: path.to_path_buf(),
            }
        })?;

        let flow = self.load_str(&content)?;
        info!("Loaded flow {} from {}", flow.name(), path.display());
        Ok(flow)
    }

    /// Load a flow from YAML text
    pub fn load_str(&self, content: &str) -> Result<Flow> {
        if content.trim().is_empty() {
            return self.load_value(Value::Null);
        }
        let document: Value = serde_yaml::from_str(content)
            .map_err(|e| FlowError::ConfigParse(format!("YAML config parsing error: {}", e)))?;
        self.load_value(document)
    }

    /// Build a flow from a parsed document; the whole document becomes the
    /// flow's config
    pub fn load_value(&self, document: Value) -> Result<Flow> {
        let name = match document.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => return Err(FlowError::ConfigParse(MISSING_NAME_MESSAGE.to_string())),
        };

        let parsed: FlowDocument = serde_yaml::from_value(document.clone())
            .map_err(|e| FlowError::ConfigParse(format!("Invalid flow document: {}", e)))?;

        let mut flow = Flow::with_config(name, document)?;
        if let Some(scheduling) = &parsed.scheduling {
            flow.set_overlap_policy(scheduling.overlap);
        }

        for (task_name, task_doc) in &parsed.tasks {
            let behavior = self.registry.create(&task_doc.kind).ok_or_else(|| {
                FlowError::ConfigParse(format!(
                    "Unsupported task type '{}' in task '{}'. Supported types: {:?}",
                    task_doc.kind,
                    task_name,
                    self.registry.list_supported_tasks()
                ))
            })?;

            let task = flow.create_task(task_name.clone(), behavior)?;
            if let Some(config) = &task_doc.config {
                task.set_config(to_json(config)?)?;
            }
            for seed in &task_doc.input {
                task.append_input_data(to_json(seed)?)?;
            }
        }

        for (task_name, task_doc) in &parsed.tasks {
            for target in &task_doc.on_complete {
                flow.add_trigger(task_name, Trigger::on_complete(target.clone()))?;
            }
            for target in &task_doc.on_error {
                flow.add_trigger(task_name, Trigger::on_error(target.clone()))?;
            }
        }

        debug!(
            "Built flow {}: {} tasks, {} triggers",
            flow.name(),
            parsed.tasks.len(),
            flow.edges().len()
        );
        Ok(flow)
    }
}

impl Default for FlowLoader {
    fn default() -> Self {
        Self::new(BehaviorRegistry::new())
    }
}

fn to_json(value: &Value) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| FlowError::ConfigParse(format!("Unsupported value in flow document: {}", e)))
}
