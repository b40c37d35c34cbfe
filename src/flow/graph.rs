// ABOUTME: Directed trigger graph built from a flow's task-to-task edges
// ABOUTME: Resolves root tasks and reachability and detects cycles by color-marking DFS

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

use super::error::{FlowError, Result};
use super::flow::Edge;
use crate::task::Outcome;

pub struct TriggerGraph {
    graph: DiGraph<String, Outcome>,
    task_indices: IndexMap<String, NodeIndex>,
}

#[derive(Clone, Copy)]
enum Mark {
    InProgress,
    Done,
}

impl TriggerGraph {
    /// Build the graph from task names and edges. Callback targets are not
    /// nodes; only task-to-task triggers become graph edges.
    pub fn build<'a, I>(task_names: I, edges: &[Edge]) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut graph = DiGraph::new();
        let mut task_indices = IndexMap::new();

        for name in task_names {
            let node = graph.add_node(name.to_string());
            task_indices.insert(name.to_string(), node);
        }

        for edge in edges {
            let Some(target) = edge.trigger.target().task_name() else {
                continue;
            };
            let source_node = *task_indices
                .get(&edge.source)
                .ok_or_else(|| FlowError::TaskNotFound {
                    task: edge.source.clone(),
                })?;
            let target_node = *task_indices
                .get(target)
                .ok_or_else(|| FlowError::TaskNotFound {
                    task: target.to_string(),
                })?;
            graph.add_edge(source_node, target_node, edge.trigger.on());
        }

        Ok(Self {
            graph,
            task_indices,
        })
    }

    pub fn contains(&self, task: &str) -> bool {
        self.task_indices.contains_key(task)
    }

    /// Tasks with no incoming triggers, in the order they were added
    pub fn roots(&self) -> Vec<String> {
        self.task_indices
            .iter()
            .filter(|(_, &node)| {
                self.graph
                    .neighbors_directed(node, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn successors(&self, task: &str) -> Vec<String> {
        self.neighbors(task, Direction::Outgoing)
    }

    pub fn predecessors(&self, task: &str) -> Vec<String> {
        self.neighbors(task, Direction::Incoming)
    }

    fn neighbors(&self, task: &str, direction: Direction) -> Vec<String> {
        match self.task_indices.get(task) {
            Some(&node) => self
                .graph
                .neighbors_directed(node, direction)
                .map(|n| self.graph[n].clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// All tasks reachable from `roots` through any trigger, roots included
    pub fn reachable_from(&self, roots: &[String]) -> HashSet<String> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = roots
            .iter()
            .filter_map(|r| self.task_indices.get(r).copied())
            .collect();

        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if !visited.contains(&next) {
                    queue.push_back(next);
                }
            }
        }

        visited.into_iter().map(|n| self.graph[n].clone()).collect()
    }

    /// Find a cycle reachable from `roots`. The returned path starts and
    /// ends on the same task.
    pub fn find_cycle(&self, roots: &[String]) -> Option<Vec<String>> {
        let mut marks = HashMap::new();
        let mut path = Vec::new();

        roots
            .iter()
            .filter_map(|r| self.task_indices.get(r).copied())
            .find_map(|node| self.visit(node, &mut marks, &mut path))
    }

    /// Find a cycle anywhere in the graph
    pub fn find_any_cycle(&self) -> Option<Vec<String>> {
        let all: Vec<String> = self.task_indices.keys().cloned().collect();
        self.find_cycle(&all)
    }

    fn visit(
        &self,
        node: NodeIndex,
        marks: &mut HashMap<NodeIndex, Mark>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<String>> {
        match marks.get(&node) {
            Some(Mark::Done) => return None,
            Some(Mark::InProgress) => {
                let start = path.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[start..].iter().map(|n| self.graph[*n].clone()).collect();
                cycle.push(self.graph[node].clone());
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(node, Mark::InProgress);
        path.push(node);

        let successors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        for next in successors {
            if let Some(cycle) = self.visit(next, marks, path) {
                return Some(cycle);
            }
        }

        path.pop();
        marks.insert(node, Mark::Done);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Trigger;

    fn edge(source: &str, trigger: Trigger) -> Edge {
        Edge {
            source: source.to_string(),
            trigger,
        }
    }

    fn diamond() -> TriggerGraph {
        let edges = vec![
            edge("task_a", Trigger::on_complete("task_b")),
            edge("task_a", Trigger::on_complete("task_c")),
            edge("task_b", Trigger::on_complete("task_d")),
            edge("task_c", Trigger::on_error("task_d")),
        ];
        TriggerGraph::build(["task_a", "task_b", "task_c", "task_d"], &edges).unwrap()
    }

    #[test]
    fn test_roots_and_neighbors() {
        let graph = diamond();

        assert_eq!(graph.roots(), vec!["task_a"]);
        assert_eq!(graph.successors("task_a").len(), 2);
        assert_eq!(graph.predecessors("task_d").len(), 2);
        assert!(graph.predecessors("task_a").is_empty());
        assert!(graph.successors("missing").is_empty());
    }

    #[test]
    fn test_reachability() {
        let graph = diamond();

        let all = graph.reachable_from(&["task_a".to_string()]);
        assert_eq!(all.len(), 4);

        let from_c = graph.reachable_from(&["task_c".to_string()]);
        assert_eq!(from_c.len(), 2);
        assert!(from_c.contains("task_d"));
        assert!(!from_c.contains("task_b"));
    }

    #[test]
    fn test_acyclic_graph_has_no_cycle() {
        let graph = diamond();
        assert!(graph.find_any_cycle().is_none());
        assert!(graph.find_cycle(&["task_a".to_string()]).is_none());
    }

    #[test]
    fn test_cycle_detection() {
        let edges = vec![
            edge("a", Trigger::on_complete("b")),
            edge("b", Trigger::on_error("a")),
        ];
        let graph = TriggerGraph::build(["a", "b"], &edges).unwrap();

        assert!(graph.roots().is_empty());
        let cycle = graph.find_any_cycle().unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 3);
    }

    #[test]
    fn test_cycle_only_reported_when_reachable() {
        let edges = vec![
            edge("c", Trigger::on_complete("d")),
            edge("d", Trigger::on_complete("c")),
        ];
        let graph = TriggerGraph::build(["a", "c", "d"], &edges).unwrap();

        assert!(graph.find_cycle(&["a".to_string()]).is_none());
        assert!(graph.find_cycle(&["c".to_string()]).is_some());
    }

    #[test]
    fn test_self_loop_is_cycle() {
        let edges = vec![edge("a", Trigger::on_complete("a"))];
        let graph = TriggerGraph::build(["a"], &edges).unwrap();

        assert_eq!(graph.find_any_cycle().unwrap(), vec!["a", "a"]);
    }

    #[test]
    fn test_callback_edges_are_not_nodes() {
        let edges = vec![edge(
            "a",
            Trigger::callback(Outcome::Complete, |_event| {}),
        )];
        let graph = TriggerGraph::build(["a"], &edges).unwrap();

        assert_eq!(graph.roots(), vec!["a"]);
        assert!(graph.successors("a").is_empty());
    }

    #[test]
    fn test_unknown_task_rejected() {
        let edges = vec![edge("a", Trigger::on_complete("ghost"))];
        let result = TriggerGraph::build(["a"], &edges);

        assert!(matches!(result, Err(FlowError::TaskNotFound { .. })));
    }
}
