// src/exec/executor_loop.rs

//! Main executor loop that manages running task attempts.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dag::ScheduledTask;
use crate::decision::DecisionRegistry;
use crate::engine::RuntimeEvent;
use crate::exec::task_runner::run_task;

/// Internal handle for a currently-running attempt.
///
/// - `cancel` stops the attempt (killing its process tree) when the executor
///   shuts down.
/// - `handle` is the Tokio task that is actually running the action.
struct ActiveTask {
    name: String,
    run_id: u64,
    attempt: u32,
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// The returned `mpsc::Sender<ScheduledTask>` is what `RealExecutorBackend`
/// uses to dispatch attempts. Each attempt is executed in its own Tokio task.
///
/// Once every sender is dropped the loop cancels the attempts that are still
/// running, waits for them to be torn down and then finishes; the returned
/// `JoinHandle` resolves at that point. Cancelled attempts never report a
/// completion.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    registry: Arc<DecisionRegistry>,
) -> (mpsc::Sender<ScheduledTask>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<ScheduledTask>(32);

    let join = tokio::spawn(async move {
        info!("executor loop started");

        let mut active: Vec<ActiveTask> = Vec::new();

        while let Some(task) = rx.recv().await {
            active.retain(|a| !a.handle.is_finished());
            active.push(start_attempt(task, &runtime_tx, &registry));
        }

        cancel_running(active).await;
        info!("executor loop finished (channel closed)");
    });

    (tx, join)
}

fn start_attempt(
    task: ScheduledTask,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    registry: &Arc<DecisionRegistry>,
) -> ActiveTask {
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let rt_tx = runtime_tx.clone();
    let registry = Arc::clone(registry);
    let name = task.name.clone();
    let run_id = task.run_id;
    let attempt = task.attempt;
    let spawn_name = name.clone();

    let handle = tokio::spawn(async move {
        run_task(task, rt_tx, registry, cancel_rx).await;
        debug!(task = %spawn_name, run_id, attempt, "task runner future finished");
    });

    ActiveTask {
        name,
        run_id,
        attempt,
        cancel: cancel_tx,
        handle,
    }
}

async fn cancel_running(active: Vec<ActiveTask>) {
    for task in active {
        if task.handle.is_finished() {
            continue;
        }

        info!(
            task = %task.name,
            run_id = task.run_id,
            attempt = task.attempt,
            "executor shutting down; cancelling running attempt"
        );
        if task.cancel.send(()).is_err() {
            debug!(task = %task.name, "attempt finished while cancelling");
        }
        if let Err(e) = task.handle.await {
            debug!(task = %task.name, error = %e, "attempt task ended abnormally");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{DateTime, Utc};

    use crate::types::TaskAction;

    #[tokio::test]
    async fn closing_the_executor_kills_running_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let late = dir.path().join("late");

        let (rt_tx, mut rt_rx) = mpsc::channel(4);
        let (tx, join) = spawn_executor(rt_tx, Arc::new(DecisionRegistry::new()));
        tx.send(ScheduledTask {
            name: "slow".into(),
            action: TaskAction::shell(format!("sleep 1; touch '{}'", late.display())),
            dag_id: "dag".into(),
            run_id: 1,
            logical_date: DateTime::<Utc>::UNIX_EPOCH,
            attempt: 1,
            execution_timeout: None,
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), join)
            .await
            .expect("executor shut down in time")
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!late.exists());
        assert!(rt_rx.try_recv().is_err(), "cancelled attempt reported a completion");
    }
}
