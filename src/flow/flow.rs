// ABOUTME: Flow execution plan owning tasks and the trigger edges between them
// ABOUTME: Handles topology assembly, run admission, cancellation, and run reports

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::details::FlowDetails;
use super::error::{FlowError, Result};
use super::graph::TriggerGraph;
use super::report::RunReport;
use super::run::FlowRun;
use crate::parser::{FlowLoader, SchedulingConfig};
use crate::task::{Task, TaskBehavior, TaskStatus, Trigger};

/// What to do when a run is requested while another run of the same flow
/// is still in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Wait for the running run to finish
    #[default]
    Queue,
    /// Fail immediately with `FlowError::RunInProgress`
    Reject,
}

/// A trigger together with the task that owns it
#[derive(Debug, Clone)]
pub struct Edge {
    pub source: String,
    pub trigger: Trigger,
}

/// Requests cancellation of the flow's current run. The request is observed
/// between task executions.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Flow {
    details: Arc<FlowDetails>,
    config: Option<serde_yaml::Value>,
    tasks: IndexMap<String, Task>,
    edges: Vec<Edge>,
    overlap: OverlapPolicy,
    frozen: AtomicBool,
    run_lock: Mutex<()>,
    cancel: CancelHandle,
    last_report: RwLock<Option<RunReport>>,
}

impl Flow {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::build(name.into(), None)
    }

    /// Create a flow that keeps `config` as its source document
    pub fn with_config(name: impl Into<String>, config: serde_yaml::Value) -> Result<Self> {
        Self::build(name.into(), Some(config))
    }

    fn build(name: String, config: Option<serde_yaml::Value>) -> Result<Self> {
        let details = FlowDetails::new(name)?;
        debug!("Created flow {} at {}", details.name(), details.timestamp());

        Ok(Self {
            details: Arc::new(details),
            config,
            tasks: IndexMap::new(),
            edges: Vec::new(),
            overlap: OverlapPolicy::default(),
            frozen: AtomicBool::new(false),
            run_lock: Mutex::new(()),
            cancel: CancelHandle::default(),
            last_report: RwLock::new(None),
        })
    }

    /// Load a flow from a YAML document using the built-in task behaviors
    pub async fn load_from_document<P: AsRef<Path>>(path: P) -> Result<Self> {
        FlowLoader::default().load(path).await
    }

    pub fn details(&self) -> &FlowDetails {
        &self.details
    }

    /// Shared handle to the details, for creating tasks owned by this flow
    pub fn details_arc(&self) -> Arc<FlowDetails> {
        Arc::clone(&self.details)
    }

    pub fn name(&self) -> &str {
        self.details.name()
    }

    pub fn config(&self) -> Option<&serde_yaml::Value> {
        self.config.as_ref()
    }

    /// Typed view of the `scheduling` block of the flow's document
    pub fn scheduling(&self) -> Result<Option<SchedulingConfig>> {
        let Some(block) = self.config.as_ref().and_then(|c| c.get("scheduling")) else {
            return Ok(None);
        };
        if block.is_null() {
            return Ok(None);
        }
        serde_yaml::from_value(block.clone())
            .map(Some)
            .map_err(|e| FlowError::ConfigParse(format!("Invalid scheduling block: {}", e)))
    }

    pub fn overlap_policy(&self) -> OverlapPolicy {
        self.overlap
    }

    pub fn set_overlap_policy(&mut self, policy: OverlapPolicy) {
        self.overlap = policy;
    }

    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap = policy;
        self
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Mutable access for assigning config or seeding input before a run
    pub fn task_mut(&mut self, name: &str) -> Option<&mut Task> {
        self.tasks.get_mut(name)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Outgoing triggers of `source`, in the order they were added
    pub fn triggers_from(&self, source: &str) -> Vec<&Trigger> {
        self.edges
            .iter()
            .filter(|e| e.source == source)
            .map(|e| &e.trigger)
            .collect()
    }

    /// Whether the topology is locked because a run has started
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    pub fn add_task(&mut self, task: Task) -> Result<()> {
        self.ensure_mutable()?;

        if *task.flow_details() != *self.details {
            return Err(FlowError::Configuration(format!(
                "Task '{}' belongs to flow '{}', not '{}'",
                task.name(),
                task.flow_details().name(),
                self.name()
            )));
        }
        if task.status() != TaskStatus::NotStarted {
            return Err(FlowError::InvalidState(format!(
                "Task '{}' has already been executed",
                task.name()
            )));
        }
        if self.tasks.contains_key(task.name()) {
            return Err(FlowError::Configuration(format!(
                "Duplicate task name: {}",
                task.name()
            )));
        }

        debug!("Flow {}: added task {} ({})", self.name(), task.name(), task.kind());
        self.tasks.insert(task.name().to_string(), task);
        Ok(())
    }

    /// Create a task owned by this flow, add it, and return it for config
    pub fn create_task(
        &mut self,
        name: impl Into<String>,
        behavior: Arc<dyn TaskBehavior>,
    ) -> Result<&mut Task> {
        let task = Task::new(name, self.details_arc(), behavior)?;
        let name = task.name().to_string();
        self.add_task(task)?;
        self.tasks
            .get_mut(&name)
            .ok_or(FlowError::TaskNotFound { task: name })
    }

    pub fn add_trigger(&mut self, source: &str, trigger: Trigger) -> Result<()> {
        self.ensure_mutable()?;

        if !self.tasks.contains_key(source) {
            return Err(FlowError::Configuration(format!(
                "Trigger source task '{}' does not exist",
                source
            )));
        }
        if let Some(target) = trigger.target().task_name() {
            if !self.tasks.contains_key(target) {
                return Err(FlowError::Configuration(format!(
                    "Trigger target task '{}' does not exist",
                    target
                )));
            }
        }
        if self
            .edges
            .iter()
            .any(|e| e.source == source && e.trigger == trigger)
        {
            return Err(FlowError::Configuration(format!(
                "Duplicate {} trigger on task '{}'",
                trigger.on(),
                source
            )));
        }

        self.edges.push(Edge {
            source: source.to_string(),
            trigger,
        });
        Ok(())
    }

    /// Check the whole trigger graph: no cycles, at least one root task
    pub fn validate(&self) -> Result<()> {
        let graph = self.graph()?;
        if let Some(cycle) = graph.find_any_cycle() {
            return Err(cyclic_graph(&cycle));
        }
        if !self.tasks.is_empty() && graph.roots().is_empty() {
            return Err(FlowError::Configuration(
                "No root tasks found - every task has an incoming trigger".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Report of the most recent run, including aborted and cancelled runs
    pub async fn last_report(&self) -> Option<RunReport> {
        self.last_report.read().await.clone()
    }

    /// Execute the flow from `roots`, or from every task without incoming
    /// triggers when `roots` is `None`.
    ///
    /// Tasks ending in ERROR are part of the returned report. A task failure
    /// that is not a validation error fails the call unless the task has an
    /// ERROR trigger to take it over. A cyclic graph, an unknown root, a
    /// rejected overlapping run, or a cancellation also fail the call.
    #[instrument(skip(self, roots), fields(flow = %self.details.name()))]
    pub async fn run(&self, roots: Option<&[&str]>) -> Result<RunReport> {
        let _guard = match self.overlap {
            OverlapPolicy::Queue => self.run_lock.lock().await,
            OverlapPolicy::Reject => self.run_lock.try_lock().map_err(|_| {
                warn!("Rejecting overlapping run of flow {}", self.name());
                FlowError::RunInProgress {
                    flow: self.name().to_string(),
                }
            })?,
        };

        self.frozen.store(true, Ordering::SeqCst);

        let graph = self.graph()?;
        let roots = self.resolve_roots(&graph, roots)?;
        if let Some(cycle) = graph.find_cycle(&roots) {
            return Err(cyclic_graph(&cycle));
        }

        let mut run = FlowRun::new(self, &graph, roots);
        let result = run.drive(&self.cancel).await;
        self.cancel.reset();

        let report = run.into_report();
        info!(
            "Flow {} run {} finished: {}",
            self.name(),
            report.run_id,
            report.summary()
        );
        *self.last_report.write().await = Some(report.clone());

        result.map(|()| report)
    }

    fn graph(&self) -> Result<TriggerGraph> {
        TriggerGraph::build(self.tasks.keys().map(String::as_str), &self.edges)
    }

    fn resolve_roots(&self, graph: &TriggerGraph, roots: Option<&[&str]>) -> Result<Vec<String>> {
        match roots {
            Some(names) => {
                if names.is_empty() && !self.tasks.is_empty() {
                    return Err(FlowError::Configuration(
                        "At least one root task must be given".to_string(),
                    ));
                }
                names
                    .iter()
                    .map(|name| {
                        if graph.contains(name) {
                            Ok(name.to_string())
                        } else {
                            Err(FlowError::TaskNotFound {
                                task: name.to_string(),
                            })
                        }
                    })
                    .collect()
            }
            None => {
                self.validate()?;
                Ok(graph.roots())
            }
        }
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_frozen() {
            return Err(FlowError::Configuration(format!(
                "Flow '{}' topology cannot change after its first run",
                self.name()
            )));
        }
        Ok(())
    }
}

fn cyclic_graph(cycle: &[String]) -> FlowError {
    FlowError::Configuration(format!(
        "Cyclic trigger graph: {}",
        cycle.join(" -> ")
    ))
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("details", &self.details)
            .field("tasks", &self.tasks.keys().collect::<Vec<_>>())
            .field("edges", &self.edges.len())
            .field("overlap", &self.overlap)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::BaseTask;

    fn flow_with(names: &[&str]) -> Flow {
        let mut flow = Flow::new("flow1").unwrap();
        for name in names {
            flow.create_task(*name, Arc::new(BaseTask)).unwrap();
        }
        flow
    }

    #[test]
    fn test_base() {
        let flow = Flow::new("flow1").unwrap();
        assert_eq!(flow.details().name(), "flow1");
        assert!(flow.config().is_none());
        assert_eq!(flow.overlap_policy(), OverlapPolicy::Queue);
    }

    #[test]
    fn test_empty_name() {
        let err = Flow::new("").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let mut flow = flow_with(&["a"]);
        let err = flow.create_task("a", Arc::new(BaseTask)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_task_from_other_flow_rejected() {
        let mut flow = Flow::new("flow1").unwrap();
        let other = Flow::new("flow2").unwrap();
        let task = Task::base("a", other.details_arc()).unwrap();

        assert!(flow.add_task(task).unwrap_err().is_configuration());
    }

    #[test]
    fn test_executed_task_rejected() {
        let mut flow = Flow::new("flow1").unwrap();
        let mut task = Task::base("a", flow.details_arc()).unwrap();
        let _ = task.rise_validation_exception("failed early");

        assert!(matches!(
            flow.add_task(task).unwrap_err(),
            FlowError::InvalidState(_)
        ));
    }

    #[test]
    fn test_trigger_endpoints_must_exist() {
        let mut flow = flow_with(&["a", "b"]);

        assert!(flow
            .add_trigger("ghost", Trigger::on_complete("b"))
            .unwrap_err()
            .is_configuration());
        assert!(flow
            .add_trigger("a", Trigger::on_complete("ghost"))
            .unwrap_err()
            .is_configuration());

        flow.add_trigger("a", Trigger::on_complete("b")).unwrap();
        flow.add_trigger("a", Trigger::on_error("b")).unwrap();
        assert!(flow
            .add_trigger("a", Trigger::on_complete("b"))
            .unwrap_err()
            .is_configuration());
        assert_eq!(flow.triggers_from("a").len(), 2);
    }

    #[test]
    fn test_validate_detects_cycle() {
        let mut flow = flow_with(&["a", "b"]);
        flow.add_trigger("a", Trigger::on_complete("b")).unwrap();
        flow.add_trigger("b", Trigger::on_complete("a")).unwrap();

        let err = flow.validate().unwrap_err();
        assert!(err.to_string().contains("Cyclic trigger graph"));
    }

    #[test]
    fn test_scheduling_block() {
        let config: serde_yaml::Value = serde_yaml::from_str(
            "name: flow1\nscheduling:\n  enabled: false\n  crontab: \"*/5 * * * *\"\n",
        )
        .unwrap();
        let flow = Flow::with_config("flow1", config).unwrap();

        let scheduling = flow.scheduling().unwrap().unwrap();
        assert!(!scheduling.enabled);
        assert_eq!(scheduling.crontab.as_deref(), Some("*/5 * * * *"));

        assert!(Flow::new("bare").unwrap().scheduling().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_topology_frozen_after_run() {
        let mut flow = flow_with(&["a"]);
        flow.run(None).await.unwrap();

        assert!(flow.is_frozen());
        let err = flow.create_task("b", Arc::new(BaseTask)).unwrap_err();
        assert!(err.is_configuration());
        let err = flow.add_trigger("a", Trigger::on_complete("a")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_empty_flow_runs_to_empty_report() {
        let flow = Flow::new("empty").unwrap();
        let report = flow.run(None).await.unwrap();
        assert!(report.tasks.is_empty());
    }
}
