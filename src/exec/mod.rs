// src/exec/mod.rs

//! Task execution layer.
//!
//! This module runs the actions of scheduled attempts (shell commands via
//! `tokio::process::Command`, branch decisions, empty tasks) and reports back
//! to the orchestration runtime via `RuntimeEvent`s.
//!
//! - [`executor_loop`] owns the main executor loop which manages attempts.
//! - [`task_runner`] runs a single attempt, enforcing its execution timeout.
//! - [`process`] spawns task shells and terminates their whole process tree.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `RealExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod executor_loop;
pub mod process;
pub mod task_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor_loop::spawn_executor;
pub use process::shell_command;
