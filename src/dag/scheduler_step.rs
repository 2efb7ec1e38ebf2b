// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::dag::task_info::{ScheduledTask, TaskRunState};
use crate::engine::TaskName;

/// A failed attempt that should be retried after `delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRequest {
    pub task: TaskName,
    pub run_id: u64,
    /// Try number of the upcoming attempt.
    pub next_attempt: u32,
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    /// At least one task ended `Failed` or `UpstreamFailed`.
    Failed,
}

/// Final states of a finished run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: u64,
    pub logical_date: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub states: BTreeMap<TaskName, TaskRunState>,
}

impl RunSummary {
    pub fn state_of(&self, task: &str) -> Option<TaskRunState> {
        self.states.get(task).copied()
    }

    pub fn tasks_in(&self, state: TaskRunState) -> Vec<&str> {
        self.states
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Structured result of a single scheduler "step".
///
/// Useful for tests that want to manually step the DAG and make assertions
/// about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Attempts that should be dispatched now.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Failed attempts waiting for their retry delay.
    pub retries: Vec<RetryRequest>,
    /// Tasks newly marked `Failed` or `UpstreamFailed` in this step.
    pub newly_failed: Vec<TaskName>,
    /// Tasks newly marked `Skipped` in this step.
    pub newly_skipped: Vec<TaskName>,
    /// Set when this step finished the current run.
    pub finished: Option<RunSummary>,
}

impl SchedulerStep {
    pub fn run_just_finished(&self) -> bool {
        self.finished.is_some()
    }

    pub fn scheduled_names(&self) -> Vec<&str> {
        self.newly_scheduled.iter().map(|t| t.name.as_str()).collect()
    }
}
