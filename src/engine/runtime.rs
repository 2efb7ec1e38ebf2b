// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dag::{RetryRequest, RunOutcome, RunSummary, ScheduledTask};
use crate::errors::Result;
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent};

/// Drives the DAG scheduler in response to `RuntimeEvent`s,
/// and delegates actual task execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading events from
/// channels, dispatching tasks to the executor and arming retry timers.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    /// Used by retry timers to wake the core up again.
    event_tx: mpsc::Sender<RuntimeEvent>,
    executor: E,
    finished: Vec<RunSummary>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("finished_runs", &self.finished.len())
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        event_tx: mpsc::Sender<RuntimeEvent>,
        executor: E,
    ) -> Self {
        Self {
            core,
            event_rx,
            event_tx,
            executor,
            finished: Vec::new(),
        }
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Feeds them into the core runtime.
    /// - Executes commands returned by the core (dispatch, retry timers, exit).
    /// - On exit, shuts the executor down so no attempt outlives the runtime.
    ///
    /// Returns the summaries of all runs that finished while the loop was
    /// active, oldest first.
    pub async fn run(mut self) -> Result<Vec<RunSummary>> {
        info!("streamdag runtime started");

        let result = self.event_loop().await;
        self.executor.shutdown().await;
        result?;

        info!(finished_runs = self.finished.len(), "runtime exiting");
        Ok(self.finished)
    }

    async fn event_loop(&mut self) -> Result<()> {
        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    return Ok(());
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                return Ok(());
            }
        }
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => {
                self.spawn_ready(tasks).await?;
            }
            CoreCommand::ScheduleRetry(retry) => {
                self.arm_retry_timer(retry);
            }
            CoreCommand::RunFinished(summary) => {
                log_summary(&summary);
                self.finished.push(summary);
            }
            CoreCommand::RequestExit => {
                // keep_running is already false; nothing else to do.
                info!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        let run_ids: Vec<_> = tasks.iter().map(|t| t.run_id).collect();
        debug!(?names, ?run_ids, "dispatching ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }

    /// Send `RetryDue` back into the loop once `retry.delay` elapsed.
    fn arm_retry_timer(&self, retry: RetryRequest) {
        let tx = self.event_tx.clone();
        debug!(
            task = %retry.task,
            run_id = retry.run_id,
            next_attempt = retry.next_attempt,
            delay = ?retry.delay,
            "arming retry timer"
        );

        tokio::spawn(async move {
            tokio::time::sleep(retry.delay).await;
            let event = RuntimeEvent::RetryDue {
                task: retry.task,
                run_id: retry.run_id,
            };
            if tx.send(event).await.is_err() {
                debug!("runtime gone before retry became due");
            }
        });
    }
}

fn log_summary(summary: &RunSummary) {
    let states: Vec<String> = summary
        .states
        .iter()
        .map(|(task, state)| format!("{task}={state}"))
        .collect();

    match summary.outcome {
        RunOutcome::Success => info!(
            run_id = summary.run_id,
            logical_date = %summary.logical_date,
            states = %states.join(" "),
            "DAG run succeeded"
        ),
        RunOutcome::Failed => {
            error!(
                run_id = summary.run_id,
                logical_date = %summary.logical_date,
                states = %states.join(" "),
                "DAG run failed"
            );
            for task in summary.tasks_in(crate::dag::TaskRunState::Failed) {
                warn!(run_id = summary.run_id, task = %task, "task failed in this run");
            }
        }
    }
}
