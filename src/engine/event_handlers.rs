// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::dag::{RetryRequest, RunSummary, ScheduledTask, Scheduler, SchedulerStep};
use crate::engine::queue::RunQueue;
use crate::engine::{RuntimeOptions, TaskName, TaskOutcome, TriggerReason};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these attempts to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Wake the core with `RetryDue` once the delay elapsed.
    ScheduleRetry(RetryRequest),
    /// A run reached its final state.
    RunFinished(RunSummary),
    /// Request that the process exits (used for `--once` when idle).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Handle a run request.
///
/// - If the scheduler is idle, the run starts right away.
/// - Otherwise the logical date is handed to the [`RunQueue`], which applies
///   the configured overlap behaviour.
pub fn handle_run_requested(
    scheduler: &mut Scheduler,
    queue: &mut RunQueue,
    options: &RuntimeOptions,
    logical_date: DateTime<Utc>,
    reason: TriggerReason,
) -> CoreStep {
    let mut commands = Vec::new();

    if scheduler.is_idle() {
        info!(%logical_date, ?reason, "run requested; starting");
        start_run(scheduler, queue, logical_date, &mut commands);
    } else if scheduler.current_logical_date() == Some(logical_date) {
        debug!(%logical_date, "run for this logical date is already active; ignoring");
    } else {
        info!(
            %logical_date,
            ?reason,
            active_run = ?scheduler.current_run_id(),
            "run requested while another run is active; queueing"
        );
        queue.record(logical_date);
    }

    finish_step(scheduler, queue, options, commands)
}

/// Handle the end of a task attempt.
///
/// Completions carrying a `run_id` other than the active run's are stale
/// (e.g. a run was abandoned) and ignored.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    queue: &mut RunQueue,
    options: &RuntimeOptions,
    task: TaskName,
    run_id: u64,
    attempt: u32,
    outcome: TaskOutcome,
) -> CoreStep {
    let mut commands = Vec::new();

    if scheduler.current_run_id() != Some(run_id) {
        warn!(
            task = %task,
            run_id,
            active_run = ?scheduler.current_run_id(),
            "completion for inactive run; ignoring"
        );
        return finish_step(scheduler, queue, options, commands);
    }

    let step = scheduler.handle_completion(&task, attempt, outcome);
    apply_scheduler_step(step, &mut commands);
    maybe_start_queued_run(scheduler, queue, &mut commands);

    finish_step(scheduler, queue, options, commands)
}

/// Handle an elapsed retry delay.
pub fn handle_retry_due(
    scheduler: &mut Scheduler,
    queue: &mut RunQueue,
    options: &RuntimeOptions,
    task: TaskName,
    run_id: u64,
) -> CoreStep {
    let mut commands = Vec::new();

    if scheduler.current_run_id() != Some(run_id) {
        debug!(task = %task, run_id, "retry for inactive run; ignoring");
        return finish_step(scheduler, queue, options, commands);
    }

    let step = scheduler.handle_retry(&task);
    apply_scheduler_step(step, &mut commands);

    finish_step(scheduler, queue, options, commands)
}

/// Translate a scheduler step into commands for the IO shell.
fn apply_scheduler_step(step: SchedulerStep, commands: &mut Vec<CoreCommand>) {
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }
    for retry in step.retries {
        commands.push(CoreCommand::ScheduleRetry(retry));
    }
    if let Some(summary) = step.finished {
        commands.push(CoreCommand::RunFinished(summary));
    }
}

/// Start a run for `logical_date`, then keep draining the queue while runs
/// finish immediately (e.g. a DAG made only of empty tasks).
fn start_run(
    scheduler: &mut Scheduler,
    queue: &mut RunQueue,
    logical_date: DateTime<Utc>,
    commands: &mut Vec<CoreCommand>,
) {
    let step = scheduler.start_new_run(logical_date);
    apply_scheduler_step(step, commands);
    maybe_start_queued_run(scheduler, queue, commands);
}

/// If the scheduler is idle and there are queued runs, start the next one.
fn maybe_start_queued_run(
    scheduler: &mut Scheduler,
    queue: &mut RunQueue,
    commands: &mut Vec<CoreCommand>,
) {
    while scheduler.is_idle() {
        let Some(logical_date) = queue.pop_next() else {
            return;
        };
        info!(%logical_date, "starting queued run");
        let step = scheduler.start_new_run(logical_date);
        apply_scheduler_step(step, commands);
    }
}

/// In `--once` mode, exit when no run is active and none is queued.
fn finish_step(
    scheduler: &Scheduler,
    queue: &RunQueue,
    options: &RuntimeOptions,
    mut commands: Vec<CoreCommand>,
) -> CoreStep {
    let mut keep_running = true;
    if options.exit_when_idle && scheduler.is_idle() && queue.is_empty() {
        keep_running = false;
        commands.push(CoreCommand::RequestExit);
    }

    CoreStep {
        commands,
        keep_running,
    }
}
