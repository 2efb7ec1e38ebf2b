// src/config/validate.rs

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::builder::DagBuilder;
use crate::config::model::{
    ConfigFile, DagSection, DagSpec, DecisionConfig, DefaultArgs, DefaultSection, RawConfigFile,
    TaskConfig, TaskOverrides, TaskSpec,
};
use crate::engine::TaskName;
use crate::errors::{Result, StreamdagError};
use crate::schedule::Schedule;
use crate::types::{parse_duration, TaskAction, TaskKind};

const TASK_ID_PATTERN: &str = r"^[A-Za-z0-9_.\-]+$";
const START_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = StreamdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let dag = dag_spec_from_section(&raw.dag)?;
        let defaults = default_args_from_section(&raw.default)?;

        let mut builder = DagBuilder::new(dag, defaults);

        for (name, decision) in raw.decision {
            builder.decision(name, decision)?;
        }

        for (id, task) in raw.task.iter() {
            let action = action_from_task_config(id, task)?;
            let overrides = overrides_from_task_config(id, task)?;
            builder.task(id.clone(), action, overrides)?;
            for dep in task.after.iter() {
                builder.edge(dep.as_str(), id.as_str());
            }
        }

        builder.build()
    }
}

/// Parse a `start_date` string (`YYYY-MM-DDTHH:MM:SS`, interpreted as UTC).
pub fn parse_start_date(s: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), START_DATE_FORMAT).map_err(|e| {
        StreamdagError::ConfigError(format!(
            "invalid start_date '{}': {} (expected YYYY-MM-DDTHH:MM:SS)",
            s, e
        ))
    })?;
    Ok(naive.and_utc())
}

pub fn dag_spec_from_section(section: &DagSection) -> Result<DagSpec> {
    let schedule: Schedule = section
        .schedule
        .parse()
        .map_err(StreamdagError::ConfigError)?;

    let start_date = match section.start_date {
        Some(ref s) => parse_start_date(s)?,
        None => DateTime::<Utc>::UNIX_EPOCH,
    };

    if section.max_queued_runs == 0 {
        return Err(StreamdagError::ConfigError(
            "[dag].max_queued_runs must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(DagSpec {
        id: section.id.clone(),
        owner: section.owner.clone(),
        schedule,
        catchup: section.catchup,
        start_date,
        overlap: section.overlap,
        max_queued_runs: section.max_queued_runs,
    })
}

pub fn default_args_from_section(section: &DefaultSection) -> Result<DefaultArgs> {
    Ok(DefaultArgs {
        retries: section.retries,
        retry_delay: duration_field("[default]", "retry_delay", &section.retry_delay)?,
        execution_timeout: section
            .execution_timeout
            .as_deref()
            .map(|s| duration_field("[default]", "execution_timeout", s))
            .transpose()?,
    })
}

fn action_from_task_config(id: &str, task: &TaskConfig) -> Result<TaskAction> {
    match task.kind {
        TaskKind::Shell => {
            let cmd = task.cmd.clone().ok_or_else(|| {
                StreamdagError::ConfigError(format!("task '{}' of kind shell needs `cmd`", id))
            })?;
            Ok(TaskAction::Shell { cmd })
        }
        TaskKind::Branch => {
            let decision = task.decision.clone().ok_or_else(|| {
                StreamdagError::ConfigError(format!(
                    "task '{}' of kind branch needs `decision`",
                    id
                ))
            })?;
            Ok(TaskAction::Branch { decision })
        }
        TaskKind::Empty => Ok(TaskAction::Empty),
    }
}

fn overrides_from_task_config(id: &str, task: &TaskConfig) -> Result<TaskOverrides> {
    let section = format!("[task.{}]", id);
    Ok(TaskOverrides {
        retries: task.retries,
        retry_delay: task
            .retry_delay
            .as_deref()
            .map(|s| duration_field(&section, "retry_delay", s))
            .transpose()?,
        execution_timeout: task
            .execution_timeout
            .as_deref()
            .map(|s| duration_field(&section, "execution_timeout", s))
            .transpose()?,
        trigger_policy: task.trigger_rule,
    })
}

fn duration_field(section: &str, field: &str, value: &str) -> Result<std::time::Duration> {
    parse_duration(value)
        .map_err(|e| StreamdagError::ConfigError(format!("{}.{}: {}", section, field, e)))
}

/// Semantic validation of a fully assembled graph.
pub(crate) fn validate_graph(
    tasks: &BTreeMap<TaskName, TaskSpec>,
    decisions: &BTreeMap<String, DecisionConfig>,
) -> Result<()> {
    ensure_has_tasks(tasks)?;
    validate_task_ids(tasks)?;
    validate_actions(tasks, decisions)?;
    validate_dag(tasks)?;
    validate_decision_branches(tasks, decisions)?;
    Ok(())
}

fn ensure_has_tasks(tasks: &BTreeMap<TaskName, TaskSpec>) -> Result<()> {
    if tasks.is_empty() {
        return Err(StreamdagError::ConfigError(
            "config must contain at least one [task.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_ids(tasks: &BTreeMap<TaskName, TaskSpec>) -> Result<()> {
    let pattern = Regex::new(TASK_ID_PATTERN).map_err(anyhow::Error::from)?;
    for id in tasks.keys() {
        if !pattern.is_match(id) {
            return Err(StreamdagError::ConfigError(format!(
                "task id '{}' may only contain letters, digits, '_', '.' and '-'",
                id
            )));
        }
    }
    Ok(())
}

fn validate_actions(
    tasks: &BTreeMap<TaskName, TaskSpec>,
    decisions: &BTreeMap<String, DecisionConfig>,
) -> Result<()> {
    for (id, spec) in tasks.iter() {
        match &spec.action {
            TaskAction::Shell { cmd } if cmd.trim().is_empty() => {
                return Err(StreamdagError::ConfigError(format!(
                    "task '{}' has an empty `cmd`",
                    id
                )));
            }
            TaskAction::Branch { decision } if !decisions.contains_key(decision) => {
                return Err(StreamdagError::ConfigError(format!(
                    "task '{}' references unknown decision '{}'",
                    id, decision
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_dag(tasks: &BTreeMap<TaskName, TaskSpec>) -> Result<()> {
    // Edge direction: dep -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for id in tasks.keys() {
        graph.add_node(id.as_str());
    }

    for (id, spec) in tasks.iter() {
        for dep in spec.after.iter() {
            graph.add_edge(dep.as_str(), id.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(StreamdagError::DagCycle(format!(
                "cycle detected in task DAG involving task '{}'",
                node
            )))
        }
    }
}

/// Every branch task must have downstream tasks, and every id its decision
/// can select must be one of them.
fn validate_decision_branches(
    tasks: &BTreeMap<TaskName, TaskSpec>,
    decisions: &BTreeMap<String, DecisionConfig>,
) -> Result<()> {
    for (id, spec) in tasks.iter() {
        let TaskAction::Branch { decision } = &spec.action else {
            continue;
        };

        let downstream: Vec<&str> = tasks
            .values()
            .filter(|t| t.after.iter().any(|dep| dep == id))
            .map(|t| t.id.as_str())
            .collect();

        if downstream.is_empty() {
            return Err(StreamdagError::ConfigError(format!(
                "branch task '{}' has no downstream tasks to choose from",
                id
            )));
        }

        if let Some(cfg) = decisions.get(decision) {
            for branch in cfg.branch_ids() {
                if !downstream.contains(&branch) {
                    return Err(StreamdagError::ConfigError(format!(
                        "decision '{}' may select '{}', which is not directly downstream of branch task '{}'",
                        decision, branch, id
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn dag_spec_for_tests() -> DagSpec {
    dag_spec_from_section(&DagSection::default()).expect("default [dag] section is valid")
}
