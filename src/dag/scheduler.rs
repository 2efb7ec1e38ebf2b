use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::model::ConfigFile;
use crate::dag::graph::DagGraph;
use crate::dag::scheduler_step::{RetryRequest, RunOutcome, RunSummary, SchedulerStep};
use crate::dag::state_manager::{ActiveRun, StateManager};
use crate::dag::task_info::{RunState, TaskInfo, TaskRunState};
use crate::decision::BranchSelection;
use crate::engine::{TaskName, TaskOutcome};
use crate::errors::StreamdagError;
use crate::types::TaskAction;

/// Scheduler holds the immutable DAG plus mutable per-run state.
///
/// It is responsible for:
/// - starting runs (every task joins each run as `Pending`)
/// - evaluating trigger policies once upstream tasks are terminal
/// - applying branch decisions (non-selected branches are skipped)
/// - turning failed attempts into retries until attempts are exhausted
/// - reporting a [`RunSummary`] when every task is terminal
#[derive(Debug)]
pub struct Scheduler {
    dag_id: String,
    graph: DagGraph,
    tasks: HashMap<TaskName, TaskInfo>,
    /// Monotonically increasing run ID.
    run_counter: u64,
    /// Currently active run, or `None` if idle.
    current: Option<ActiveRun>,
}

impl Scheduler {
    /// Construct a scheduler from a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let graph = DagGraph::from_config(cfg);
        let tasks = cfg
            .task
            .iter()
            .map(|(id, spec)| (id.clone(), TaskInfo::from_spec(spec)))
            .collect();

        Self {
            dag_id: cfg.dag.id.clone(),
            graph,
            tasks,
            run_counter: 0,
            current: None,
        }
    }

    /// Returns `true` if there is currently no active run.
    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    /// Current run ID, if any.
    pub fn current_run_id(&self) -> Option<u64> {
        self.current.map(|r| r.run_id)
    }

    pub fn current_logical_date(&self) -> Option<DateTime<Utc>> {
        self.current.map(|r| r.logical_date)
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    /// Read-only view of the given task's run state.
    ///
    /// After a run finished, this still reports the terminal state from that
    /// run until the next one starts.
    pub fn run_state_of(&self, task: &str) -> Option<TaskRunState> {
        let info = self.tasks.get(task)?;
        Some(info.run_state.into())
    }

    /// Attempts started for `task` in the current (or last) run.
    pub fn attempts_of(&self, task: &str) -> Option<u32> {
        self.tasks.get(task).map(|info| info.attempts)
    }

    /// Start a new run for `logical_date`, resetting per-run state, and
    /// dispatch whatever is immediately eligible (the DAG roots).
    ///
    /// Ignored with a warning if a run is already active.
    pub fn start_new_run(&mut self, logical_date: DateTime<Utc>) -> SchedulerStep {
        if let Some(active) = self.current {
            warn!(
                run_id = active.run_id,
                "start_new_run called while a run is active; ignoring"
            );
            return SchedulerStep::default();
        }

        self.run_counter += 1;
        let run = ActiveRun {
            run_id: self.run_counter,
            logical_date,
        };
        self.current = Some(run);

        info!(
            dag_id = %self.dag_id,
            run_id = run.run_id,
            logical_date = %logical_date,
            "scheduler: starting new DAG run"
        );

        let mut step = SchedulerStep::default();
        let mut manager = StateManager::new(&self.graph, &mut self.tasks, &self.dag_id, run);
        manager.mark_all_pending();
        manager.resolve(&mut step);
        step.finished = self.maybe_finish_run();
        step
    }

    /// Handle the end of an attempt (production API).
    pub fn handle_completion(&mut self, task: &str, attempt: u32, outcome: TaskOutcome) -> SchedulerStep {
        self.completion_step_internal(task, attempt, outcome)
    }

    /// Handle an elapsed retry delay (production API).
    pub fn handle_retry(&mut self, task: &str) -> SchedulerStep {
        self.retry_step_internal(task)
    }

    /// Convenience for tests: complete the *current* attempt of `task`.
    pub fn step_completion(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        let attempt = self.attempts_of(task).unwrap_or(0);
        self.completion_step_internal(task, attempt, outcome)
    }

    /// Determine whether all tasks are in a terminal state and clear
    /// `current` if so.
    fn maybe_finish_run(&mut self) -> Option<RunSummary> {
        let run = self.current?;

        let manager = StateManager::new(&self.graph, &mut self.tasks, &self.dag_id, run);
        if !manager.all_tasks_terminal() {
            return None;
        }

        let states: BTreeMap<TaskName, TaskRunState> = self
            .tasks
            .values()
            .map(|info| (info.name.clone(), info.run_state.into()))
            .collect();

        let failed = states
            .values()
            .any(|s| matches!(s, TaskRunState::Failed | TaskRunState::UpstreamFailed));
        let outcome = if failed {
            RunOutcome::Failed
        } else {
            RunOutcome::Success
        };

        info!(
            run_id = run.run_id,
            ?outcome,
            "scheduler: all tasks terminal; marking run as finished"
        );
        self.current = None;

        Some(RunSummary {
            run_id: run.run_id,
            logical_date: run.logical_date,
            outcome,
            states,
        })
    }

    fn completion_step_internal(&mut self, task: &str, attempt: u32, outcome: TaskOutcome) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let Some(run) = self.current else {
            warn!(task = %task, "completion with no active run; ignoring");
            return step;
        };

        let Some(info) = self.tasks.get(task) else {
            warn!(task = %task, "completion for unknown task; ignoring");
            return step;
        };

        if info.run_state != Some(RunState::Running) || info.attempts != attempt {
            warn!(
                task = %task,
                run_id = run.run_id,
                attempt,
                current_attempt = info.attempts,
                state = %TaskRunState::from(info.run_state),
                "stale completion; ignoring"
            );
            return step;
        }

        let outcome = match outcome {
            TaskOutcome::Branched(selection) => match self.check_selection(task, &selection) {
                Ok(()) => TaskOutcome::Branched(selection),
                Err(err) => {
                    error!(task = %task, run_id = run.run_id, error = %err, "branch decision rejected");
                    TaskOutcome::Failed(-1)
                }
            },
            other => other,
        };

        if outcome.is_failure() {
            return self.attempt_failed(task, attempt, outcome, run);
        }

        let mut manager = StateManager::new(&self.graph, &mut self.tasks, &self.dag_id, run);
        manager.set_state(task, RunState::Success);

        if let TaskOutcome::Branched(selection) = outcome {
            info!(task = %task, run_id = run.run_id, follow = %selection, "branch completed");
            let mut skipped = manager.apply_branch(task, &selection);
            step.newly_skipped.append(&mut skipped);
        } else {
            debug!(task = %task, run_id = run.run_id, attempt, "task completed successfully");
        }

        manager.resolve(&mut step);
        step.finished = self.maybe_finish_run();
        step
    }

    /// Either schedule a retry or mark `task` failed for good.
    fn attempt_failed(&mut self, task: &str, attempt: u32, outcome: TaskOutcome, run: ActiveRun) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let Some(info) = self.tasks.get_mut(task) else {
            return step;
        };

        if attempt < info.max_attempts {
            info.run_state = Some(RunState::UpForRetry);
            warn!(
                task = %task,
                run_id = run.run_id,
                attempt,
                max_attempts = info.max_attempts,
                ?outcome,
                retry_in = ?info.retry_delay,
                "task attempt failed; will retry"
            );
            step.retries.push(RetryRequest {
                task: task.to_string(),
                run_id: run.run_id,
                next_attempt: attempt + 1,
                delay: info.retry_delay,
            });
            return step;
        }

        info.run_state = Some(RunState::Failed);
        error!(
            task = %task,
            run_id = run.run_id,
            attempts = attempt,
            ?outcome,
            "task failed; retries exhausted"
        );
        step.newly_failed.push(task.to_string());

        let mut manager = StateManager::new(&self.graph, &mut self.tasks, &self.dag_id, run);
        manager.resolve(&mut step);
        step.finished = self.maybe_finish_run();
        step
    }

    fn retry_step_internal(&mut self, task: &str) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let Some(run) = self.current else {
            warn!(task = %task, "retry with no active run; ignoring");
            return step;
        };

        let up_for_retry = self
            .tasks
            .get(task)
            .map(|info| info.run_state == Some(RunState::UpForRetry))
            .unwrap_or(false);
        if !up_for_retry {
            warn!(task = %task, run_id = run.run_id, "retry for task not awaiting retry; ignoring");
            return step;
        }

        let mut manager = StateManager::new(&self.graph, &mut self.tasks, &self.dag_id, run);
        if let Some(scheduled) = manager.start_attempt(task) {
            step.newly_scheduled.push(scheduled);
        }
        step
    }

    /// A selection may only name direct downstream tasks of the branch task.
    fn check_selection(&self, task: &str, selection: &BranchSelection) -> Result<(), StreamdagError> {
        let is_branch = self
            .tasks
            .get(task)
            .map(|info| matches!(info.action, TaskAction::Branch { .. }))
            .unwrap_or(false);
        if !is_branch {
            return Err(StreamdagError::InvalidSelection {
                task: task.to_string(),
                reason: "task is not a branch task".to_string(),
            });
        }

        let downstream = self.graph.dependents_of(task);
        for name in selection.iter() {
            if !downstream.iter().any(|d| d == name) {
                return Err(StreamdagError::InvalidSelection {
                    task: task.to_string(),
                    reason: format!("'{}' is not directly downstream", name),
                });
            }
        }
        Ok(())
    }
}
