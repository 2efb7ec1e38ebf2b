// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledTask`s to the executor
//! - arming retry timers
//! - handling Ctrl+C / shutdown
//!
//! The core is unit tested without any Tokio, channels, or processes.

use crate::dag::Scheduler;
use crate::engine::event_handlers::{
    handle_retry_due, handle_run_requested, handle_task_completion, CoreStep,
};
use crate::engine::queue::RunQueue;
use crate::engine::{RuntimeEvent, RuntimeOptions};
use crate::types::OverlapBehaviour;

/// Pure core runtime state.
///
/// This owns:
/// - the DAG scheduler
/// - the queue of runs that became due while another run was active
/// - runtime options (e.g. `exit_when_idle`)
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    queue: RunQueue,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(
        scheduler: Scheduler,
        behaviour: OverlapBehaviour,
        max_queued_runs: usize,
        options: RuntimeOptions,
    ) -> Self {
        let queue = RunQueue::new(behaviour, max_queued_runs);
        Self {
            scheduler,
            queue,
            options,
        }
    }

    /// Expose whether the scheduler is idle (for tests).
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    /// Expose queue emptiness (for tests).
    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::RunRequested {
                logical_date,
                reason,
            } => handle_run_requested(
                &mut self.scheduler,
                &mut self.queue,
                &self.options,
                logical_date,
                reason,
            ),
            RuntimeEvent::TaskCompleted {
                task,
                run_id,
                attempt,
                outcome,
            } => handle_task_completion(
                &mut self.scheduler,
                &mut self.queue,
                &self.options,
                task,
                run_id,
                attempt,
                outcome,
            ),
            RuntimeEvent::RetryDue { task, run_id } => handle_retry_due(
                &mut self.scheduler,
                &mut self.queue,
                &self.options,
                task,
                run_id,
            ),
            RuntimeEvent::ShutdownRequested => CoreStep {
                commands: Vec::new(),
                keep_running: false,
            },
        }
    }
}
