// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::engine::TaskName;
use crate::schedule::Schedule;
use crate::types::{OverlapBehaviour, TaskAction, TaskKind, TriggerPolicy};

/// Configuration exactly as read from a TOML file, before validation.
///
/// ```toml
/// [dag]
/// id = "streaming_data_processing_dag"
/// owner = "train"
/// schedule = "@daily"
/// start_date = "2024-09-16T12:20:00"
///
/// [default]
/// retries = 1
/// retry_delay = "5s"
///
/// [task.run_spark]
/// cmd = "python read_and_write_spark.py"
/// retries = 2
/// execution_timeout = "20m"
///
/// [task.create_new_topic]
/// kind = "branch"
/// decision = "create_new_topic"
/// after = ["run_spark"]
/// ```
///
/// Use [`ConfigFile::try_from`] to obtain the validated form.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub dag: DagSection,

    #[serde(default)]
    pub default: DefaultSection,

    /// All tasks from `[task.<id>]`, keyed by task id.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,

    /// Decision callables from `[decision.<name>]`.
    #[serde(default)]
    pub decision: BTreeMap<String, DecisionConfig>,
}

/// `[dag]` section: static metadata read once at load time.
#[derive(Debug, Clone, Deserialize)]
pub struct DagSection {
    #[serde(default = "default_dag_id")]
    pub id: String,

    #[serde(default = "default_owner")]
    pub owner: String,

    /// `@once`, `@hourly`, `@daily`, `@weekly` or a fixed duration (`"30m"`).
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Whether missed intervals since `start_date` are backfilled.
    #[serde(default)]
    pub catchup: bool,

    /// First logical date, `YYYY-MM-DDTHH:MM:SS` in UTC. Defaults to the
    /// Unix epoch, which together with `catchup = false` simply means "the
    /// latest interval".
    #[serde(default)]
    pub start_date: Option<String>,

    #[serde(default)]
    pub overlap: OverlapBehaviour,

    /// Maximum number of runs remembered while another run is active.
    #[serde(default = "default_max_queued_runs")]
    pub max_queued_runs: usize,
}

fn default_dag_id() -> String {
    "streamdag".to_string()
}

fn default_owner() -> String {
    "streamdag".to_string()
}

fn default_schedule() -> String {
    "@daily".to_string()
}

fn default_max_queued_runs() -> usize {
    1
}

impl Default for DagSection {
    fn default() -> Self {
        Self {
            id: default_dag_id(),
            owner: default_owner(),
            schedule: default_schedule(),
            catchup: false,
            start_date: None,
            overlap: OverlapBehaviour::default(),
            max_queued_runs: default_max_queued_runs(),
        }
    }
}

/// `[default]` section: arguments applied to every task unless overridden.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultSection {
    #[serde(default)]
    pub retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,

    #[serde(default)]
    pub execution_timeout: Option<String>,
}

fn default_retry_delay() -> String {
    "5m".to_string()
}

impl Default for DefaultSection {
    fn default() -> Self {
        Self {
            retries: 0,
            retry_delay: default_retry_delay(),
            execution_timeout: None,
        }
    }
}

/// `[task.<id>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskConfig {
    #[serde(default)]
    pub kind: TaskKind,

    /// Command line for `kind = "shell"`.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Name of a `[decision.<name>]` section for `kind = "branch"`.
    #[serde(default)]
    pub decision: Option<String>,

    /// Direct upstream tasks.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub retry_delay: Option<String>,

    #[serde(default)]
    pub execution_timeout: Option<String>,

    #[serde(default)]
    pub trigger_rule: TriggerPolicy,
}

/// `[decision.<name>]` section, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionConfig {
    /// Make sure a messaging topic exists, creating it when absent.
    ///
    /// `exists_cmd` must exit 0 iff the topic exists; `create_cmd` must exit
    /// 0 on successful creation. Both may contain a `{topic}` placeholder.
    EnsureTopic {
        topic: String,
        exists_cmd: String,
        create_cmd: String,
        when_created: TaskName,
        when_exists: TaskName,
    },
    /// Always follow the same branches.
    Static { follow: Vec<TaskName> },
}

impl DecisionConfig {
    /// All branch ids this decision may ever select.
    pub fn branch_ids(&self) -> Vec<&str> {
        match self {
            DecisionConfig::EnsureTopic {
                when_created,
                when_exists,
                ..
            } => vec![when_created.as_str(), when_exists.as_str()],
            DecisionConfig::Static { follow } => follow.iter().map(|s| s.as_str()).collect(),
        }
    }
}

/// Resolved default arguments, passed explicitly to every task definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultArgs {
    pub retries: u32,
    pub retry_delay: Duration,
    pub execution_timeout: Option<Duration>,
}

impl Default for DefaultArgs {
    fn default() -> Self {
        Self {
            retries: 0,
            retry_delay: Duration::from_secs(300),
            execution_timeout: None,
        }
    }
}

/// Per-task overrides of [`DefaultArgs`] plus the trigger policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskOverrides {
    pub retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub execution_timeout: Option<Duration>,
    pub trigger_policy: TriggerPolicy,
}

impl TaskOverrides {
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    pub fn trigger_policy(mut self, policy: TriggerPolicy) -> Self {
        self.trigger_policy = policy;
        self
    }
}

/// Validated DAG-level metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagSpec {
    pub id: String,
    pub owner: String,
    pub schedule: Schedule,
    pub catchup: bool,
    pub start_date: DateTime<Utc>,
    pub overlap: OverlapBehaviour,
    pub max_queued_runs: usize,
}

/// Fully resolved task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub id: TaskName,
    pub action: TaskAction,
    /// Direct upstream tasks, sorted and de-duplicated.
    pub after: Vec<TaskName>,
    pub retries: u32,
    pub retry_delay: Duration,
    pub execution_timeout: Option<Duration>,
    pub trigger_policy: TriggerPolicy,
}

impl TaskSpec {
    /// Total number of attempts allowed (first try plus retries).
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Validated, immutable graph definition.
///
/// Only constructible through validation (`TryFrom<RawConfigFile>` or
/// [`crate::config::DagBuilder::build`]), so holders can rely on:
/// unique ids, known dependencies, acyclicity and consistent decisions.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub dag: DagSpec,
    pub task: BTreeMap<TaskName, TaskSpec>,
    pub decision: BTreeMap<String, DecisionConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        dag: DagSpec,
        task: BTreeMap<TaskName, TaskSpec>,
        decision: BTreeMap<String, DecisionConfig>,
    ) -> Self {
        Self {
            dag,
            task,
            decision,
        }
    }
}
