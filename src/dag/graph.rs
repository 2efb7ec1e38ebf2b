// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::ConfigFile;
use crate::engine::TaskName;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    /// Direct upstream tasks.
    deps: Vec<TaskName>,
    /// Direct downstream tasks.
    dependents: Vec<TaskName>,
}

/// In-memory DAG keyed by task id.
///
/// Acyclicity is already validated in `config::validate`; here we just keep
/// adjacency information for scheduling and diagnostics.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: HashMap<TaskName, DagNode>,
}

impl DagGraph {
    /// Build a DAG from a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let mut nodes: HashMap<TaskName, DagNode> = cfg
            .task
            .iter()
            .map(|(id, spec)| {
                (
                    id.clone(),
                    DagNode {
                        deps: spec.after.clone(),
                        dependents: Vec::new(),
                    },
                )
            })
            .collect();

        // `cfg.task` is a BTreeMap, so dependents come out sorted.
        for (id, spec) in cfg.task.iter() {
            for dep in spec.after.iter() {
                if let Some(dep_node) = nodes.get_mut(dep) {
                    dep_node.dependents.push(id.clone());
                }
            }
        }

        Self { nodes }
    }

    /// Return all task ids.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Immediate upstream tasks of a task.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate downstream tasks of a task.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Tasks without upstream dependencies.
    pub fn roots(&self) -> Vec<&str> {
        let mut roots: Vec<&str> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.deps.is_empty())
            .map(|(id, _)| id.as_str())
            .collect();
        roots.sort_unstable();
        roots
    }

    /// A topological ordering of all tasks (upstream first), or `None` if
    /// the graph contains a cycle.
    pub fn topological_order(&self) -> Option<Vec<&str>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        let mut ids: Vec<&str> = self.tasks().collect();
        ids.sort_unstable();
        for &id in ids.iter() {
            graph.add_node(id);
        }
        for &id in ids.iter() {
            for dependent in self.dependents_of(id) {
                graph.add_edge(id, dependent.as_str(), ());
            }
        }
        toposort(&graph, None).ok()
    }
}
