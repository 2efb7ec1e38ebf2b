// src/dag/task_info.rs

//! Task metadata and per-run state.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::model::TaskSpec;
use crate::engine::TaskName;
use crate::types::{TaskAction, TriggerPolicy};

/// Per-run state of a task (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Waiting for upstream tasks to reach a terminal state.
    Pending,
    /// An attempt has been dispatched to the executor.
    Running,
    /// The last attempt failed; waiting for the retry delay to elapse.
    UpForRetry,
    Success,
    /// All attempts failed.
    Failed,
    /// Not run: excluded by a branch decision or by its trigger policy.
    Skipped,
    /// Not run because an upstream task failed.
    UpstreamFailed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Success | RunState::Failed | RunState::Skipped | RunState::UpstreamFailed
        )
    }
}

/// Public, read-only view of a task's per-run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskRunState {
    /// No run has included this task yet.
    NotInRun,
    Pending,
    Running,
    UpForRetry,
    Success,
    Failed,
    Skipped,
    UpstreamFailed,
}

impl TaskRunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskRunState::Success
                | TaskRunState::Failed
                | TaskRunState::Skipped
                | TaskRunState::UpstreamFailed
        )
    }
}

impl From<Option<RunState>> for TaskRunState {
    fn from(state: Option<RunState>) -> Self {
        match state {
            None => TaskRunState::NotInRun,
            Some(RunState::Pending) => TaskRunState::Pending,
            Some(RunState::Running) => TaskRunState::Running,
            Some(RunState::UpForRetry) => TaskRunState::UpForRetry,
            Some(RunState::Success) => TaskRunState::Success,
            Some(RunState::Failed) => TaskRunState::Failed,
            Some(RunState::Skipped) => TaskRunState::Skipped,
            Some(RunState::UpstreamFailed) => TaskRunState::UpstreamFailed,
        }
    }
}

impl fmt::Display for TaskRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskRunState::NotInRun => "not_in_run",
            TaskRunState::Pending => "pending",
            TaskRunState::Running => "running",
            TaskRunState::UpForRetry => "up_for_retry",
            TaskRunState::Success => "success",
            TaskRunState::Failed => "failed",
            TaskRunState::Skipped => "skipped",
            TaskRunState::UpstreamFailed => "upstream_failed",
        };
        f.write_str(s)
    }
}

/// Static task information derived from config, plus per-run state.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: TaskName,
    pub action: TaskAction,
    pub policy: TriggerPolicy,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub execution_timeout: Option<Duration>,
    /// Direct upstream tasks.
    pub deps: Vec<TaskName>,

    /// Per-run state (None until the first run starts).
    pub run_state: Option<RunState>,

    /// Attempts started in the current run.
    pub attempts: u32,
}

impl TaskInfo {
    pub fn from_spec(spec: &TaskSpec) -> Self {
        Self {
            name: spec.id.clone(),
            action: spec.action.clone(),
            policy: spec.trigger_policy,
            max_attempts: spec.max_attempts(),
            retry_delay: spec.retry_delay,
            execution_timeout: spec.execution_timeout,
            deps: spec.after.clone(),
            run_state: None,
            attempts: 0,
        }
    }
}

/// An attempt the scheduler wants the executor to run now.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub name: TaskName,
    pub action: TaskAction,
    pub dag_id: String,
    /// All tasks of the same DAG run share the same `run_id`.
    pub run_id: u64,
    pub logical_date: DateTime<Utc>,
    /// 1-based try number within the run.
    pub attempt: u32,
    pub execution_timeout: Option<Duration>,
}

impl ScheduledTask {
    pub fn from_task_info(
        info: &TaskInfo,
        dag_id: &str,
        run_id: u64,
        logical_date: DateTime<Utc>,
    ) -> Self {
        Self {
            name: info.name.clone(),
            action: info.action.clone(),
            dag_id: dag_id.to_string(),
            run_id,
            logical_date,
            attempt: info.attempts,
            execution_timeout: info.execution_timeout,
        }
    }
}
