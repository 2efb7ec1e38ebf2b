// src/exec/task_runner.rs

//! Runs a single task attempt and reports its outcome.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::dag::ScheduledTask;
use crate::decision::{DecisionRegistry, RunContext};
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::exec::process::{kill_process_tree, shell_command};
use crate::types::TaskAction;

/// Run one attempt of `task` and emit a `TaskCompleted` event.
///
/// - Errors while starting or waiting for the action are reported as
///   `Failed(-1)` and logged.
/// - If the cancel channel fires, the attempt's process tree is killed and
///   **no** `TaskCompleted` event is sent for it.
pub async fn run_task(
    task: ScheduledTask,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    registry: Arc<DecisionRegistry>,
    cancel_rx: oneshot::Receiver<()>,
) {
    let outcome = match run_action(&task, &registry, cancel_rx).await {
        Ok(Some(outcome)) => outcome,
        Ok(None) => return,
        Err(err) => {
            error!(
                task = %task.name,
                run_id = task.run_id,
                attempt = task.attempt,
                error = %format!("{err:#}"),
                "task execution error"
            );
            TaskOutcome::Failed(-1)
        }
    };

    let event = RuntimeEvent::TaskCompleted {
        task: task.name.clone(),
        run_id: task.run_id,
        attempt: task.attempt,
        outcome,
    };
    if runtime_tx.send(event).await.is_err() {
        debug!(task = %task.name, run_id = task.run_id, "runtime gone; dropping completion");
    }
}

/// `Ok(None)` means the attempt was cancelled.
async fn run_action(
    task: &ScheduledTask,
    registry: &DecisionRegistry,
    cancel_rx: oneshot::Receiver<()>,
) -> Result<Option<TaskOutcome>> {
    match &task.action {
        TaskAction::Empty => Ok(Some(TaskOutcome::Success)),
        TaskAction::Shell { cmd } => run_shell(task, cmd, cancel_rx).await,
        TaskAction::Branch { decision } => run_decision(task, decision, registry, cancel_rx).await,
    }
}

async fn run_shell(
    task: &ScheduledTask,
    cmd_str: &str,
    mut cancel_rx: oneshot::Receiver<()>,
) -> Result<Option<TaskOutcome>> {
    info!(
        task = %task.name,
        run_id = task.run_id,
        attempt = task.attempt,
        cmd = %cmd_str,
        "starting task process"
    );

    let mut cmd = shell_command(cmd_str);
    cmd.env("STREAMDAG_DAG_ID", &task.dag_id)
        .env("STREAMDAG_RUN_ID", task.run_id.to_string())
        .env("STREAMDAG_TASK_ID", &task.name)
        .env("STREAMDAG_TRY_NUMBER", task.attempt.to_string())
        .env("STREAMDAG_LOGICAL_DATE", task.logical_date.to_rfc3339())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for task '{}'", task.name))?;

    // Always consume output so buffers don't fill.
    if let Some(stdout) = child.stdout.take() {
        let task_name = task.name.clone();
        let run_id = task.run_id;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(task = %task_name, run_id, "stdout: {}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let task_name = task.name.clone();
        let run_id = task.run_id;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task_name, run_id, "stderr: {}", line);
            }
        });
    }

    let limit = task.execution_timeout;

    tokio::select! {
        waited = wait_within(&mut child, limit) => {
            match waited {
                Some(status) => {
                    let status: ExitStatus = status.with_context(|| {
                        format!("waiting for process of task '{}'", task.name)
                    })?;
                    let code = status.code().unwrap_or(-1);
                    info!(
                        task = %task.name,
                        run_id = task.run_id,
                        attempt = task.attempt,
                        exit_code = code,
                        success = status.success(),
                        "task process exited"
                    );
                    Ok(Some(if status.success() {
                        TaskOutcome::Success
                    } else {
                        TaskOutcome::Failed(code)
                    }))
                }
                None => {
                    warn!(
                        task = %task.name,
                        run_id = task.run_id,
                        attempt = task.attempt,
                        timeout = ?limit,
                        "execution timeout exceeded; killing process"
                    );
                    if let Err(e) = kill_process_tree(&mut child).await {
                        warn!(task = %task.name, error = %e, "failed to kill timed-out process");
                    }
                    Ok(Some(TaskOutcome::TimedOut))
                }
            }
        }

        Ok(()) = &mut cancel_rx => {
            info!(
                task = %task.name,
                run_id = task.run_id,
                attempt = task.attempt,
                "cancellation requested for running attempt; killing process"
            );
            if let Err(e) = kill_process_tree(&mut child).await {
                warn!(task = %task.name, error = %e, "failed to kill child process on cancellation");
            }
            Ok(None)
        }
    }
}

/// Wait for the child, giving up after `limit`. `None` means timed out.
async fn wait_within(
    child: &mut tokio::process::Child,
    limit: Option<Duration>,
) -> Option<std::io::Result<ExitStatus>> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
        None => Some(child.wait().await),
    }
}

async fn run_decision(
    task: &ScheduledTask,
    name: &str,
    registry: &DecisionRegistry,
    mut cancel_rx: oneshot::Receiver<()>,
) -> Result<Option<TaskOutcome>> {
    let decision = registry
        .get(name)
        .ok_or_else(|| anyhow!("no decision registered under '{}'", name))?;

    let ctx = RunContext {
        dag_id: task.dag_id.clone(),
        run_id: task.run_id,
        logical_date: task.logical_date,
        task: task.name.clone(),
        attempt: task.attempt,
    };

    info!(
        task = %task.name,
        run_id = task.run_id,
        attempt = task.attempt,
        decision = %name,
        "evaluating branch decision"
    );

    let decided = async {
        match task.execution_timeout {
            Some(limit) => tokio::time::timeout(limit, decision.decide(&ctx)).await.ok(),
            None => Some(decision.decide(&ctx).await),
        }
    };

    tokio::select! {
        result = decided => match result {
            Some(Ok(selection)) => Ok(Some(TaskOutcome::Branched(selection))),
            Some(Err(err)) => Err(err.context(format!("decision '{}' failed", name))),
            None => {
                warn!(
                    task = %task.name,
                    run_id = task.run_id,
                    attempt = task.attempt,
                    "decision exceeded execution timeout"
                );
                Ok(Some(TaskOutcome::TimedOut))
            }
        },
        Ok(()) = &mut cancel_rx => {
            info!(task = %task.name, run_id = task.run_id, "cancellation requested for running decision");
            Ok(None)
        }
    }
}
