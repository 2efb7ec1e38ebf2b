// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production executor implementation in [`executor_loop`](super::executor_loop).
//!
//! - `RealExecutorBackend` is the default implementation used by `streamdag`.
//!   It wraps the `spawn_executor` loop and forwards scheduled attempts over
//!   an mpsc channel.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which attempts were dispatched and directly emits `TaskCompleted` events.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::dag::ScheduledTask;
use crate::decision::DecisionRegistry;
use crate::engine::RuntimeEvent;
use crate::errors::{Error, Result};

use super::executor_loop::spawn_executor;

/// Trait abstracting how scheduled attempts are executed.
pub trait ExecutorBackend: Send {
    /// Dispatch the given attempts for execution.
    ///
    /// Every dispatched attempt must eventually be answered with a
    /// `RuntimeEvent::TaskCompleted` carrying its `run_id` and `attempt`.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Stop whatever is still running. Called once when the runtime exits;
    /// attempts stopped here are not answered.
    fn shutdown(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

/// Real executor backend used in production.
pub struct RealExecutorBackend {
    tx: Option<mpsc::Sender<ScheduledTask>>,
    executor: Option<JoinHandle<()>>,
}

impl RealExecutorBackend {
    /// Create a new real executor backend, wiring it to the given runtime
    /// event sender and decision registry.
    ///
    /// This spawns the background executor loop immediately.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, registry: Arc<DecisionRegistry>) -> Self {
        let (tx, executor) = spawn_executor(runtime_tx, registry);
        Self {
            tx: Some(tx),
            executor: Some(executor),
        }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            let Some(tx) = tx else {
                return Err(anyhow!("executor already shut down").into());
            };
            for task in tasks {
                tx.send(task).await.map_err(Error::from)?;
            }
            Ok(())
        })
    }

    fn shutdown(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        // Closing the channel makes the loop cancel running attempts.
        self.tx = None;
        let executor = self.executor.take();

        Box::pin(async move {
            if let Some(executor) = executor {
                if let Err(e) = executor.await {
                    warn!(error = %e, "executor loop ended abnormally");
                }
            }
        })
    }
}
