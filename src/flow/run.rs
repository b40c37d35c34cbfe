// ABOUTME: Single flow run over fresh task instances
// ABOUTME: Propagates outcomes breadth-first with per-target pending-predecessor counters

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, error, info, warn};

use super::error::{FlowError, Result};
use super::flow::{CancelHandle, Flow};
use super::graph::TriggerGraph;
use super::report::{RunReport, TaskReport};
use crate::task::{Outcome, Task, TriggerEvent, TriggerTarget};

pub(crate) struct FlowRun<'a> {
    flow: &'a Flow,
    graph: &'a TriggerGraph,
    run_id: String,
    started_at: DateTime<Utc>,
    tasks: IndexMap<String, Task>,
    /// Unresolved incoming triggers per waiting task
    pending: HashMap<String, usize>,
    /// Incoming triggers that fired per waiting task
    fired: HashMap<String, usize>,
    executed: HashSet<String>,
    skipped: HashSet<String>,
    queue: VecDeque<String>,
}

impl<'a> FlowRun<'a> {
    pub(crate) fn new(flow: &'a Flow, graph: &'a TriggerGraph, roots: Vec<String>) -> Self {
        let tasks: IndexMap<String, Task> = flow
            .tasks()
            .map(|task| (task.name().to_string(), task.instantiate()))
            .collect();

        // Only triggers whose source can run in this traversal are waited on.
        let reachable = graph.reachable_from(&roots);
        let pending: HashMap<String, usize> = reachable
            .iter()
            .filter(|name| !roots.contains(name))
            .map(|name| {
                let incoming = graph
                    .predecessors(name)
                    .iter()
                    .filter(|source| reachable.contains(*source))
                    .count();
                (name.clone(), incoming)
            })
            .filter(|(_, incoming)| *incoming > 0)
            .collect();

        Self {
            flow,
            graph,
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            tasks,
            pending,
            fired: HashMap::new(),
            executed: HashSet::new(),
            skipped: HashSet::new(),
            queue: roots.into_iter().collect(),
        }
    }

    pub(crate) async fn drive(&mut self, cancel: &CancelHandle) -> Result<()> {
        info!(
            "Starting flow run: {} (run_id: {}, roots: {:?})",
            self.flow.name(),
            self.run_id,
            self.queue
        );

        while let Some(name) = self.queue.pop_front() {
            if cancel.is_cancelled() {
                warn!("Flow {} cancelled before task {}", self.flow.name(), name);
                return Err(FlowError::Cancelled {
                    flow: self.flow.name().to_string(),
                });
            }

            if !self.executed.insert(name.clone()) {
                continue;
            }

            let outcome = self.execute(&name).await?;
            self.propagate(&name, outcome)?;
        }

        Ok(())
    }

    async fn execute(&mut self, name: &str) -> Result<Outcome> {
        let task = self
            .tasks
            .get_mut(name)
            .ok_or_else(|| FlowError::TaskNotFound {
                task: name.to_string(),
            })?;

        let executed = task.execute().await;
        let outcome = Outcome::from_status(task.status());
        match (executed, outcome) {
            (Ok(()), Some(outcome)) => Ok(outcome),
            (Err(e), Some(Outcome::Error)) if e.is_validation() => {
                info!("Task {} finished with ERROR: {}", name, e);
                Ok(Outcome::Error)
            }
            (Err(source), _) if self.intercepts_errors(name) => {
                warn!("Task {} failed, routing to its error triggers: {}", name, source);
                Ok(Outcome::Error)
            }
            (Err(source), _) => {
                error!("Task {} aborted flow {}: {}", name, self.flow.name(), source);
                Err(FlowError::TaskAborted {
                    task: name.to_string(),
                    source,
                })
            }
            (Ok(()), None) => Err(FlowError::InvalidState(format!(
                "Task '{}' finished without a terminal status",
                name
            ))),
        }
    }

    /// Whether `source` declares an ERROR trigger that takes over its failures
    fn intercepts_errors(&self, source: &str) -> bool {
        self.flow
            .edges()
            .iter()
            .any(|e| e.source == source && e.trigger.on() == Outcome::Error)
    }

    fn propagate(&mut self, source: &str, outcome: Outcome) -> Result<()> {
        let flow = self.flow;
        let contribution = self.contribution(source, outcome);

        for edge in flow.edges().iter().filter(|e| e.source == source) {
            let trigger = &edge.trigger;
            match trigger.target() {
                TriggerTarget::Callback(callback) => {
                    if trigger.matches(outcome) {
                        debug!("Firing {} callback of task {}", outcome, source);
                        (**callback)(&TriggerEvent {
                            flow: flow.name().to_string(),
                            source: source.to_string(),
                            outcome,
                            contribution: contribution.clone(),
                        });
                    }
                }
                TriggerTarget::Task(target) => {
                    if !self.pending.contains_key(target) {
                        if trigger.matches(outcome) {
                            debug!(
                                "Task {} already executed, ignoring {} trigger from {}",
                                target, outcome, source
                            );
                        }
                        continue;
                    }

                    if trigger.matches(outcome) {
                        let task =
                            self.tasks
                                .get_mut(target)
                                .ok_or_else(|| FlowError::TaskNotFound {
                                    task: target.clone(),
                                })?;
                        task.append_input_data(contribution.clone())?;
                        *self.fired.entry(target.clone()).or_insert(0) += 1;
                        debug!("Task {} delivered {} contribution to {}", source, outcome, target);
                    }

                    self.resolve(target);
                }
            }
        }

        Ok(())
    }

    /// Resolve one incoming trigger of `target`. Once every incoming trigger
    /// is resolved the target is queued if any fired, otherwise skipped, and
    /// a skip resolves the skipped task's own outgoing triggers in turn.
    fn resolve(&mut self, target: &str) {
        let mut stack = vec![target.to_string()];

        while let Some(name) = stack.pop() {
            let Some(count) = self.pending.get_mut(&name) else {
                continue;
            };
            *count = count.saturating_sub(1);
            if *count > 0 {
                continue;
            }
            self.pending.remove(&name);

            if self.fired.get(&name).copied().unwrap_or(0) > 0 {
                self.queue.push_back(name);
            } else {
                debug!("Skipping task {}: none of its triggers fired", name);
                stack.extend(self.graph.successors(&name));
                self.skipped.insert(name);
            }
        }
    }

    fn contribution(&self, source: &str, outcome: Outcome) -> Value {
        let Some(task) = self.tasks.get(source) else {
            return Value::Null;
        };
        match outcome {
            Outcome::Complete => task.output().cloned().unwrap_or(Value::Null),
            Outcome::Error => Value::String(task.error().unwrap_or_default().to_string()),
        }
    }

    pub(crate) fn into_report(self) -> RunReport {
        let tasks = self
            .tasks
            .iter()
            .map(|(name, task)| {
                let skipped = self.skipped.contains(name);
                (name.clone(), TaskReport::from_task(task, skipped))
            })
            .collect();

        RunReport {
            flow: self.flow.name().to_string(),
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            tasks,
        }
    }
}
