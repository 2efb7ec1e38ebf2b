// src/decision/mod.rs

//! Branch decisions.
//!
//! A branch task consults a [`Decision`] once per attempt. The decision
//! returns a [`BranchSelection`]: the subset of the branch task's direct
//! downstream tasks to keep active. The scheduler marks every other direct
//! downstream task as skipped for the run.
//!
//! - [`topic`] implements the "ensure a messaging topic exists" decision.
//! - [`StaticDecision`] always follows the same branches.

pub mod topic;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::model::{ConfigFile, DecisionConfig};
use crate::engine::TaskName;

pub use topic::{CommandTopicAdmin, EnsureTopic, InMemoryTopicAdmin, TopicAdmin, TopicBranches, TopicOutcome};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Set of downstream task ids a branch task decided to follow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchSelection {
    follow: BTreeSet<TaskName>,
}

impl BranchSelection {
    pub fn one(task: impl Into<TaskName>) -> Self {
        let mut follow = BTreeSet::new();
        follow.insert(task.into());
        Self { follow }
    }

    pub fn many<I, S>(tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        Self {
            follow: tasks.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, task: &str) -> bool {
        self.follow.contains(task)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.follow.iter().map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.follow.is_empty()
    }
}

impl fmt::Display for BranchSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Run-scoped context handed to a decision.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub dag_id: String,
    pub run_id: u64,
    pub logical_date: DateTime<Utc>,
    pub task: TaskName,
    pub attempt: u32,
}

/// A branch decision.
///
/// May be invoked more than once for the same run (retries), so
/// implementations must be idempotent: repeated calls converge on the same
/// external state and return a valid selection each time.
pub trait Decision: Send + Sync + fmt::Debug {
    fn decide<'a>(&'a self, ctx: &'a RunContext) -> BoxFuture<'a, anyhow::Result<BranchSelection>>;
}

/// Decision that always selects the same branches.
#[derive(Debug, Clone)]
pub struct StaticDecision {
    selection: BranchSelection,
}

impl StaticDecision {
    pub fn new(selection: BranchSelection) -> Self {
        Self { selection }
    }
}

impl Decision for StaticDecision {
    fn decide<'a>(&'a self, _ctx: &'a RunContext) -> BoxFuture<'a, anyhow::Result<BranchSelection>> {
        let selection = self.selection.clone();
        Box::pin(async move { Ok(selection) })
    }
}

/// Decisions by name, as referenced from `[task.<id>] decision = "..."`.
#[derive(Debug, Clone, Default)]
pub struct DecisionRegistry {
    decisions: HashMap<String, Arc<dyn Decision>>,
}

impl DecisionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the production decisions declared in `[decision.<name>]`.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let mut registry = Self::new();

        for (name, decision) in cfg.decision.iter() {
            let built: Arc<dyn Decision> = match decision {
                DecisionConfig::EnsureTopic {
                    topic,
                    exists_cmd,
                    create_cmd,
                    when_created,
                    when_exists,
                } => Arc::new(EnsureTopic::new(
                    topic.clone(),
                    Arc::new(CommandTopicAdmin::new(exists_cmd.clone(), create_cmd.clone())),
                    TopicBranches {
                        created: when_created.clone(),
                        already_exists: when_exists.clone(),
                    },
                )),
                DecisionConfig::Static { follow } => Arc::new(StaticDecision::new(
                    BranchSelection::many(follow.iter().cloned()),
                )),
            };
            registry.register(name.clone(), built);
        }

        registry
    }

    /// Register (or replace) a decision.
    pub fn register(&mut self, name: impl Into<String>, decision: Arc<dyn Decision>) {
        self.decisions.insert(name.into(), decision);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Decision>> {
        self.decisions.get(name).cloned()
    }
}
