// src/config/builder.rs

//! Programmatic graph definition.
//!
//! [`DagBuilder`] is the single construction path for a [`ConfigFile`]: the
//! TOML loader feeds its sections through the same calls, so both routes get
//! identical validation.
//!
//! ```ignore
//! let mut dag = DagBuilder::new(spec, defaults);
//! dag.task("extract", TaskAction::shell("./extract.sh"), TaskOverrides::default())?;
//! dag.task("a", TaskAction::Empty, TaskOverrides::default())?;
//! dag.task("b", TaskAction::Empty, TaskOverrides::default())?;
//! dag.edge("extract", ["a", "b"]);
//! let cfg = dag.build()?;
//! ```

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::model::{ConfigFile, DagSpec, DecisionConfig, DefaultArgs, TaskOverrides, TaskSpec};
use crate::config::validate::validate_graph;
use crate::engine::TaskName;
use crate::errors::{Result, StreamdagError};
use crate::types::TaskAction;

/// One side of an edge declaration: a single id or a set of ids.
pub trait IntoTaskIds {
    fn into_task_ids(self) -> Vec<TaskName>;
}

impl IntoTaskIds for &str {
    fn into_task_ids(self) -> Vec<TaskName> {
        vec![self.to_string()]
    }
}

impl IntoTaskIds for String {
    fn into_task_ids(self) -> Vec<TaskName> {
        vec![self]
    }
}

impl IntoTaskIds for &[&str] {
    fn into_task_ids(self) -> Vec<TaskName> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl<const N: usize> IntoTaskIds for [&str; N] {
    fn into_task_ids(self) -> Vec<TaskName> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl IntoTaskIds for Vec<&str> {
    fn into_task_ids(self) -> Vec<TaskName> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl IntoTaskIds for Vec<String> {
    fn into_task_ids(self) -> Vec<TaskName> {
        self
    }
}

/// Accumulates tasks, edges and decisions, then validates them as a whole.
#[derive(Debug, Clone)]
pub struct DagBuilder {
    dag: DagSpec,
    defaults: DefaultArgs,
    tasks: BTreeMap<TaskName, TaskSpec>,
    decisions: BTreeMap<String, DecisionConfig>,
    /// `(upstream, downstream)` pairs in declaration order.
    edges: Vec<(TaskName, TaskName)>,
}

impl DagBuilder {
    pub fn new(dag: DagSpec, defaults: DefaultArgs) -> Self {
        Self {
            dag,
            defaults,
            tasks: BTreeMap::new(),
            decisions: BTreeMap::new(),
            edges: Vec::new(),
        }
    }

    /// Register a task. The id must be unique within the graph.
    pub fn task(
        &mut self,
        id: impl Into<TaskName>,
        action: TaskAction,
        overrides: TaskOverrides,
    ) -> Result<&mut Self> {
        let id = id.into();
        if self.tasks.contains_key(&id) {
            return Err(StreamdagError::DuplicateTask(id));
        }

        let spec = TaskSpec {
            id: id.clone(),
            action,
            after: Vec::new(),
            retries: overrides.retries.unwrap_or(self.defaults.retries),
            retry_delay: overrides.retry_delay.unwrap_or(self.defaults.retry_delay),
            execution_timeout: overrides
                .execution_timeout
                .or(self.defaults.execution_timeout),
            trigger_policy: overrides.trigger_policy,
        };

        debug!(task = %id, kind = ?spec.action.kind(), "task defined");
        self.tasks.insert(id, spec);
        Ok(self)
    }

    /// Declare that every task in `targets` depends on every task in
    /// `sources`. Unknown ids are reported by [`DagBuilder::build`].
    pub fn edge(&mut self, sources: impl IntoTaskIds, targets: impl IntoTaskIds) -> &mut Self {
        let sources = sources.into_task_ids();
        let targets = targets.into_task_ids();

        for target in &targets {
            for source in &sources {
                self.edges.push((source.clone(), target.clone()));
            }
        }
        self
    }

    /// Register a decision callable under `name`.
    pub fn decision(&mut self, name: impl Into<String>, decision: DecisionConfig) -> Result<&mut Self> {
        let name = name.into();
        if self.decisions.contains_key(&name) {
            return Err(StreamdagError::ConfigError(format!(
                "decision '{}' defined more than once",
                name
            )));
        }
        self.decisions.insert(name, decision);
        Ok(self)
    }

    /// Resolve edges and validate the whole graph.
    pub fn build(mut self) -> Result<ConfigFile> {
        for (source, target) in std::mem::take(&mut self.edges) {
            if !self.tasks.contains_key(&source) {
                return Err(StreamdagError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    target, source
                )));
            }
            if source == target {
                return Err(StreamdagError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    target
                )));
            }
            let spec = self
                .tasks
                .get_mut(&target)
                .ok_or_else(|| StreamdagError::TaskNotFound(target.clone()))?;
            spec.after.push(source);
        }

        for spec in self.tasks.values_mut() {
            spec.after.sort();
            spec.after.dedup();
        }

        validate_graph(&self.tasks, &self.decisions)?;

        Ok(ConfigFile::new_unchecked(self.dag, self.tasks, self.decisions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::validate::dag_spec_for_tests;

    fn builder() -> DagBuilder {
        DagBuilder::new(dag_spec_for_tests(), DefaultArgs::default())
    }

    #[test]
    fn duplicate_task_is_rejected() {
        let mut dag = builder();
        dag.task("a", TaskAction::Empty, TaskOverrides::default())
            .unwrap();
        let err = dag
            .task("a", TaskAction::shell("echo"), TaskOverrides::default())
            .unwrap_err();
        assert!(matches!(err, StreamdagError::DuplicateTask(id) if id == "a"));
    }

    #[test]
    fn many_to_many_edges_expand_to_every_pair() {
        let mut dag = builder();
        for id in ["a", "b", "c", "d"] {
            dag.task(id, TaskAction::Empty, TaskOverrides::default())
                .unwrap();
        }
        dag.edge(["a", "b"], ["c", "d"]);
        let cfg = dag.build().unwrap();

        assert_eq!(cfg.task["c"].after, vec!["a", "b"]);
        assert_eq!(cfg.task["d"].after, vec!["a", "b"]);
        assert!(cfg.task["a"].after.is_empty());
    }

    #[test]
    fn overrides_win_over_defaults() {
        let defaults = DefaultArgs {
            retries: 1,
            retry_delay: std::time::Duration::from_secs(5),
            execution_timeout: None,
        };
        let mut dag = DagBuilder::new(dag_spec_for_tests(), defaults);
        dag.task(
            "spark",
            TaskAction::shell("spark-submit job.py"),
            TaskOverrides::default()
                .retries(2)
                .execution_timeout(std::time::Duration::from_secs(60)),
        )
        .unwrap();
        dag.task("plain", TaskAction::shell("true"), TaskOverrides::default())
            .unwrap();
        let cfg = dag.build().unwrap();

        let spark = &cfg.task["spark"];
        assert_eq!(spark.retries, 2);
        assert_eq!(spark.max_attempts(), 3);
        assert_eq!(spark.retry_delay, std::time::Duration::from_secs(5));
        assert_eq!(spark.execution_timeout, Some(std::time::Duration::from_secs(60)));

        let plain = &cfg.task["plain"];
        assert_eq!(plain.retries, 1);
        assert_eq!(plain.execution_timeout, None);
    }

    #[test]
    fn edge_to_undeclared_task_is_rejected() {
        let mut dag = builder();
        dag.task("a", TaskAction::Empty, TaskOverrides::default())
            .unwrap();
        dag.edge("ghost", "a");
        let err = dag.build().unwrap_err();
        assert!(matches!(err, StreamdagError::ConfigError(msg) if msg.contains("ghost")));
    }
}
