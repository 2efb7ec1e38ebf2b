// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] holds the directed acyclic graph of tasks.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which tasks are eligible, skipped, retried or failed.
//! - [`task_info`] provides task metadata and scheduled task types.
//! - [`scheduler_step`] defines the result types for scheduler steps.
//! - [`state_manager`] evaluates trigger policies and per-run transitions.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::DagGraph;
pub use scheduler::Scheduler;
pub use scheduler_step::{RetryRequest, RunOutcome, RunSummary, SchedulerStep};
pub use state_manager::Eligibility;
pub use task_info::{ScheduledTask, TaskRunState};
