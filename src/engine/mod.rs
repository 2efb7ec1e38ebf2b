// src/engine/mod.rs

//! Orchestration engine for streamdag.
//!
//! This module ties together:
//! - the DAG scheduler (per-run task states, trigger policies, retries)
//! - the run queue (what happens when a run is due while another is active)
//! - the schedule ticker that requests runs per interval
//! - the main runtime event loop that reacts to:
//!   - run requests
//!   - task attempt completions
//!   - retry timers
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use chrono::{DateTime, Utc};

use crate::decision::BranchSelection;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Outcome of a single task attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    /// Non-zero exit code, or `-1` when the action could not be run.
    Failed(i32),
    /// The attempt exceeded its execution timeout and was killed.
    TimedOut,
    /// A branch task finished and selected these downstream tasks.
    Branched(BranchSelection),
}

impl TaskOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed(_) | TaskOutcome::TimedOut)
    }
}

/// Why a run was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// Requested from the command line (`--once`).
    Manual,
    /// An interval of the DAG's schedule closed.
    Schedule,
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// If true, exit the runtime once no run is active and none is queued
    /// (used for `--once`).
    pub exit_when_idle: bool,
}

/// Events flowing into the runtime from the ticker, executor and timers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A run for `logical_date` should be started.
    RunRequested {
        logical_date: DateTime<Utc>,
        reason: TriggerReason,
    },
    /// An attempt of a task finished.
    TaskCompleted {
        task: TaskName,
        run_id: u64,
        attempt: u32,
        outcome: TaskOutcome,
    },
    /// The retry delay of a task elapsed.
    RetryDue { task: TaskName, run_id: u64 },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod runtime;
pub mod ticker;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use queue::RunQueue;
pub use runtime::Runtime;
pub use ticker::{spawn_ticker, TickerHandle};
pub use crate::types::OverlapBehaviour;
