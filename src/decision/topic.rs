// src/decision/topic.rs

//! "Ensure topic" decision: check whether a messaging topic exists, create it
//! when absent, and branch on which of the two happened.

use std::collections::HashSet;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context};
use tracing::{debug, info};

use crate::decision::{BoxFuture, BranchSelection, Decision, RunContext};
use crate::engine::TaskName;
use crate::exec::process::{shell_command, ProcessGroupGuard};

/// What happened to the topic during this evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicOutcome {
    Created,
    AlreadyExists,
}

/// Downstream task to follow for each [`TopicOutcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBranches {
    pub created: TaskName,
    pub already_exists: TaskName,
}

impl TopicBranches {
    pub fn select(&self, outcome: TopicOutcome) -> BranchSelection {
        match outcome {
            TopicOutcome::Created => BranchSelection::one(self.created.clone()),
            TopicOutcome::AlreadyExists => BranchSelection::one(self.already_exists.clone()),
        }
    }
}

/// Administrative access to a messaging system's topics.
pub trait TopicAdmin: Send + Sync + std::fmt::Debug {
    fn topic_exists<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, anyhow::Result<bool>>;
    fn create_topic<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Topic admin backed by shell commands (e.g. `kafka-topics.sh`).
///
/// `{topic}` in either command is replaced by the topic name. The existence
/// check reports "exists" iff its command exits with status 0.
#[derive(Debug, Clone)]
pub struct CommandTopicAdmin {
    exists_cmd: String,
    create_cmd: String,
}

impl CommandTopicAdmin {
    pub fn new(exists_cmd: impl Into<String>, create_cmd: impl Into<String>) -> Self {
        Self {
            exists_cmd: exists_cmd.into(),
            create_cmd: create_cmd.into(),
        }
    }
}

async fn run_status(cmd: &str) -> anyhow::Result<std::process::ExitStatus> {
    let mut command = shell_command(cmd);
    command
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .with_context(|| format!("running topic admin command `{}`", cmd))?;
    // A decision that runs out of time is dropped mid-wait; take the
    // command's whole process group down with it.
    let mut guard = ProcessGroupGuard::new(&child);
    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("waiting for topic admin command `{}`", cmd))?;
    guard.disarm();

    if !output.stderr.is_empty() {
        debug!(cmd = %cmd, stderr = %String::from_utf8_lossy(&output.stderr).trim(), "topic admin stderr");
    }
    Ok(output.status)
}

impl TopicAdmin for CommandTopicAdmin {
    fn topic_exists<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, anyhow::Result<bool>> {
        Box::pin(async move {
            let cmd = self.exists_cmd.replace("{topic}", topic);
            let status = run_status(&cmd).await?;
            Ok(status.success())
        })
    }

    fn create_topic<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let cmd = self.create_cmd.replace("{topic}", topic);
            let status = run_status(&cmd).await?;
            if !status.success() {
                bail!(
                    "creating topic '{}' failed with exit code {}",
                    topic,
                    status.code().unwrap_or(-1)
                );
            }
            Ok(())
        })
    }
}

/// In-process topic admin holding a set of topic names.
#[derive(Debug, Default)]
pub struct InMemoryTopicAdmin {
    topics: Mutex<HashSet<String>>,
}

impl InMemoryTopicAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: Mutex::new(topics.into_iter().map(Into::into).collect()),
        }
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics
            .lock()
            .map(|set| set.contains(topic))
            .unwrap_or(false)
    }
}

impl TopicAdmin for InMemoryTopicAdmin {
    fn topic_exists<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, anyhow::Result<bool>> {
        Box::pin(async move {
            let set = self.topics.lock().map_err(|_| anyhow!("topic set poisoned"))?;
            Ok(set.contains(topic))
        })
    }

    fn create_topic<'a>(&'a self, topic: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let mut set = self.topics.lock().map_err(|_| anyhow!("topic set poisoned"))?;
            set.insert(topic.to_string());
            Ok(())
        })
    }
}

/// Branch on whether `topic` had to be created.
#[derive(Debug, Clone)]
pub struct EnsureTopic {
    topic: String,
    admin: Arc<dyn TopicAdmin>,
    branches: TopicBranches,
}

impl EnsureTopic {
    pub fn new(topic: impl Into<String>, admin: Arc<dyn TopicAdmin>, branches: TopicBranches) -> Self {
        Self {
            topic: topic.into(),
            admin,
            branches,
        }
    }

    /// Check-then-create. A second evaluation after a successful creation
    /// reports [`TopicOutcome::AlreadyExists`].
    pub async fn ensure(&self) -> anyhow::Result<TopicOutcome> {
        if self.admin.topic_exists(&self.topic).await? {
            return Ok(TopicOutcome::AlreadyExists);
        }
        self.admin.create_topic(&self.topic).await?;
        Ok(TopicOutcome::Created)
    }
}

impl Decision for EnsureTopic {
    fn decide<'a>(&'a self, ctx: &'a RunContext) -> BoxFuture<'a, anyhow::Result<BranchSelection>> {
        Box::pin(async move {
            let outcome = self
                .ensure()
                .await
                .with_context(|| format!("ensuring topic '{}'", self.topic))?;
            let selection = self.branches.select(outcome);
            info!(
                task = %ctx.task,
                run_id = ctx.run_id,
                topic = %self.topic,
                ?outcome,
                follow = %selection,
                "topic decision made"
            );
            Ok(selection)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ctx() -> RunContext {
        RunContext {
            dag_id: "test".to_string(),
            run_id: 1,
            logical_date: Utc::now(),
            task: "create_new_topic".to_string(),
            attempt: 1,
        }
    }

    fn branches() -> TopicBranches {
        TopicBranches {
            created: "topic_created".to_string(),
            already_exists: "topic_already_exists".to_string(),
        }
    }

    #[tokio::test]
    async fn creates_missing_topic_then_reports_existing() {
        let admin = Arc::new(InMemoryTopicAdmin::new());
        let decision = EnsureTopic::new("events", admin.clone(), branches());

        let first = decision.decide(&ctx()).await.unwrap();
        assert_eq!(first, BranchSelection::one("topic_created"));
        assert!(admin.contains("events"));

        let second = decision.decide(&ctx()).await.unwrap();
        assert_eq!(second, BranchSelection::one("topic_already_exists"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_admin_uses_exit_status_and_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("{topic}");
        let admin = CommandTopicAdmin::new(
            format!("test -f '{}'", marker.display()),
            format!("touch '{}'", marker.display()),
        );

        assert!(!admin.topic_exists("orders").await.unwrap());
        admin.create_topic("orders").await.unwrap();
        assert!(admin.topic_exists("orders").await.unwrap());
        assert!(dir.path().join("orders").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_creation_is_an_error() {
        let admin = Arc::new(CommandTopicAdmin::new("false", "exit 3"));
        let decision = EnsureTopic::new("events", admin, branches());
        assert!(decision.decide(&ctx()).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn abandoned_admin_command_is_killed_with_its_children() {
        let dir = tempfile::tempdir().unwrap();
        let late = dir.path().join("late");
        let admin = CommandTopicAdmin::new(
            format!("(sleep 1; touch '{}'); true", late.display()),
            "true",
        );

        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            admin.topic_exists("orders"),
        )
        .await;
        assert!(waited.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(!late.exists());
    }
}
