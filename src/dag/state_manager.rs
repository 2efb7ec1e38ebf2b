// src/dag/state_manager.rs

//! Per-run state management: trigger policy evaluation and transitions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo};
use crate::dag::DagGraph;
use crate::decision::BranchSelection;
use crate::engine::TaskName;
use crate::types::{TaskAction, TriggerPolicy};

/// Identity of the active run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveRun {
    pub run_id: u64,
    pub logical_date: DateTime<Utc>,
}

/// Result of evaluating a pending task's trigger policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Some upstream task is not terminal yet.
    Wait,
    Ready,
    Skip,
    UpstreamFailed,
}

/// Manages per-run state transitions for tasks.
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    tasks: &'a mut HashMap<TaskName, TaskInfo>,
    dag_id: &'a str,
    run: ActiveRun,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a DagGraph,
        tasks: &'a mut HashMap<TaskName, TaskInfo>,
        dag_id: &'a str,
        run: ActiveRun,
    ) -> Self {
        Self {
            graph,
            tasks,
            dag_id,
            run,
        }
    }

    /// Put every task of the graph into the run as `Pending`.
    pub fn mark_all_pending(&mut self) {
        for info in self.tasks.values_mut() {
            info.run_state = Some(RunState::Pending);
            info.attempts = 0;
        }
    }

    /// Start the next attempt of `name`: mark it `Running` and describe it
    /// for the executor.
    pub fn start_attempt(&mut self, name: &str) -> Option<ScheduledTask> {
        let info = self.tasks.get_mut(name)?;
        info.attempts += 1;
        info.run_state = Some(RunState::Running);

        if info.attempts == 1 {
            info!(
                task = %info.name,
                run_id = self.run.run_id,
                "scheduling task for first attempt in this DAG run"
            );
        } else {
            info!(
                task = %info.name,
                run_id = self.run.run_id,
                attempt = info.attempts,
                max_attempts = info.max_attempts,
                "scheduling task retry"
            );
        }

        Some(ScheduledTask::from_task_info(
            info,
            self.dag_id,
            self.run.run_id,
            self.run.logical_date,
        ))
    }

    /// Skip every direct downstream task of `branch_task` that the selection
    /// does not follow.
    ///
    /// Returns the tasks that were newly skipped.
    pub fn apply_branch(&mut self, branch_task: &str, selection: &BranchSelection) -> Vec<TaskName> {
        let mut skipped = Vec::new();

        for name in self.graph.dependents_of(branch_task).iter() {
            if selection.contains(name) {
                continue;
            }
            if let Some(info) = self.tasks.get_mut(name) {
                if matches!(info.run_state, Some(RunState::Pending)) {
                    info.run_state = Some(RunState::Skipped);
                    debug!(
                        task = %info.name,
                        branch = %branch_task,
                        "not selected by branch; marking Skipped"
                    );
                    skipped.push(info.name.clone());
                }
            }
        }

        skipped
    }

    /// Evaluate trigger policies of all pending tasks until nothing changes.
    ///
    /// - `Ready` tasks are dispatched, except `Empty` tasks which succeed in
    ///   place.
    /// - `Skip` / `UpstreamFailed` tasks are resolved without running, which
    ///   may in turn settle their own dependents.
    pub fn resolve(&mut self, step: &mut SchedulerStep) {
        loop {
            let decisions: Vec<(TaskName, Eligibility)> = {
                let ro = ReadOnlyStateManager::new(self.tasks);
                let mut pending: Vec<&TaskInfo> = self
                    .tasks
                    .values()
                    .filter(|info| matches!(info.run_state, Some(RunState::Pending)))
                    .collect();
                pending.sort_by(|a, b| a.name.cmp(&b.name));
                pending
                    .into_iter()
                    .map(|info| (info.name.clone(), ro.eligibility(info)))
                    .filter(|(_, e)| *e != Eligibility::Wait)
                    .collect()
            };

            if decisions.is_empty() {
                break;
            }

            for (name, eligibility) in decisions {
                match eligibility {
                    Eligibility::Ready => {
                        let is_empty = self
                            .tasks
                            .get(&name)
                            .map(|info| info.action == TaskAction::Empty)
                            .unwrap_or(false);
                        if is_empty {
                            self.set_state(&name, RunState::Success);
                            debug!(task = %name, run_id = self.run.run_id, "empty task resolved as Success");
                        } else if let Some(task) = self.start_attempt(&name) {
                            step.newly_scheduled.push(task);
                        }
                    }
                    Eligibility::Skip => {
                        self.set_state(&name, RunState::Skipped);
                        debug!(task = %name, run_id = self.run.run_id, "trigger policy resolved to Skipped");
                        step.newly_skipped.push(name);
                    }
                    Eligibility::UpstreamFailed => {
                        self.set_state(&name, RunState::UpstreamFailed);
                        warn!(task = %name, run_id = self.run.run_id, "upstream failed; task will not run");
                        step.newly_failed.push(name);
                    }
                    Eligibility::Wait => {}
                }
            }
        }
    }

    /// Check if all tasks are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks
            .values()
            .all(|info| info.run_state.map(|s| s.is_terminal()).unwrap_or(true))
    }

    pub fn set_state(&mut self, name: &str, state: RunState) {
        if let Some(info) = self.tasks.get_mut(name) {
            info.run_state = Some(state);
        }
    }
}

/// A read-only view for evaluating trigger policies while the tasks map is
/// only borrowed shared.
pub struct ReadOnlyStateManager<'a> {
    tasks: &'a HashMap<TaskName, TaskInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(tasks: &'a HashMap<TaskName, TaskInfo>) -> Self {
        Self { tasks }
    }

    /// Apply the task's trigger policy to the current states of its direct
    /// upstream tasks.
    pub fn eligibility(&self, info: &TaskInfo) -> Eligibility {
        let mut succeeded = 0usize;
        let mut skipped = 0usize;
        let mut failed = 0usize;

        for dep_name in &info.deps {
            let Some(dep) = self.tasks.get(dep_name) else {
                warn!(
                    task = %info.name,
                    dep = %dep_name,
                    "dependency missing from tasks map"
                );
                return Eligibility::Wait;
            };

            match dep.run_state {
                Some(RunState::Success) => succeeded += 1,
                Some(RunState::Skipped) => skipped += 1,
                Some(RunState::Failed) | Some(RunState::UpstreamFailed) => failed += 1,
                Some(RunState::Pending) | Some(RunState::Running) | Some(RunState::UpForRetry) | None => {
                    return Eligibility::Wait;
                }
            }
        }

        if failed > 0 {
            return Eligibility::UpstreamFailed;
        }

        match info.policy {
            TriggerPolicy::AllSucceeded if skipped > 0 => Eligibility::Skip,
            TriggerPolicy::NoneFailedMinOneSuccess if !info.deps.is_empty() && succeeded == 0 => {
                Eligibility::Skip
            }
            _ => Eligibility::Ready,
        }
    }
}
