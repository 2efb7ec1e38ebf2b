use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use streamdag::dag::ScheduledTask;
use streamdag::decision::{DecisionRegistry, RunContext};
use streamdag::engine::{RuntimeEvent, TaskOutcome};
use streamdag::errors::Result;
use streamdag::exec::ExecutorBackend;
use streamdag::types::TaskAction;
use tokio::sync::mpsc;

/// One dispatched attempt, as seen by the fake executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedAttempt {
    pub task: String,
    pub run_id: u64,
    pub attempt: u32,
}

/// Shared log of dispatched attempts.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    inner: Arc<Mutex<Vec<ExecutedAttempt>>>,
}

impl ExecutionLog {
    pub fn attempts(&self) -> Vec<ExecutedAttempt> {
        self.inner.lock().unwrap().clone()
    }

    /// Task names in dispatch order (one entry per attempt).
    pub fn tasks(&self) -> Vec<String> {
        self.attempts().into_iter().map(|a| a.task).collect()
    }

    pub fn attempts_of(&self, task: &str) -> usize {
        self.attempts().iter().filter(|a| a.task == task).count()
    }

    fn push(&self, attempt: ExecutedAttempt) {
        self.inner.lock().unwrap().push(attempt);
    }
}

/// A fake executor that:
/// - records every dispatched attempt
/// - replies with the next scripted outcome for the task, or
/// - evaluates the branch decision from its registry, or
/// - reports `Success`.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    log: ExecutionLog,
    script: Arc<Mutex<HashMap<String, VecDeque<TaskOutcome>>>>,
    registry: Arc<DecisionRegistry>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            log: ExecutionLog::default(),
            script: Arc::new(Mutex::new(HashMap::new())),
            registry: Arc::new(DecisionRegistry::new()),
        }
    }

    /// Use these decisions for branch tasks without scripted outcomes.
    pub fn with_registry(mut self, registry: Arc<DecisionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Queue outcomes for consecutive attempts of `task`.
    pub fn script<I>(self, task: &str, outcomes: I) -> Self
    where
        I: IntoIterator<Item = TaskOutcome>,
    {
        self.script
            .lock()
            .unwrap()
            .entry(task.to_string())
            .or_default()
            .extend(outcomes);
        self
    }

    pub fn log(&self) -> ExecutionLog {
        self.log.clone()
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let log = self.log.clone();
        let script = Arc::clone(&self.script);
        let registry = Arc::clone(&self.registry);

        Box::pin(async move {
            for t in tasks {
                log.push(ExecutedAttempt {
                    task: t.name.clone(),
                    run_id: t.run_id,
                    attempt: t.attempt,
                });

                let scripted = script
                    .lock()
                    .unwrap()
                    .get_mut(&t.name)
                    .and_then(|q| q.pop_front());
                let registry = Arc::clone(&registry);
                let tx = tx.clone();

                // Reply from a separate task so the runtime never blocks on
                // its own channel.
                tokio::spawn(async move {
                    let outcome = match scripted {
                        Some(outcome) => outcome,
                        None => decide_or_succeed(&t, &registry).await,
                    };
                    let _ = tx
                        .send(RuntimeEvent::TaskCompleted {
                            task: t.name.clone(),
                            run_id: t.run_id,
                            attempt: t.attempt,
                            outcome,
                        })
                        .await;
                });
            }
            Ok(())
        })
    }
}

async fn decide_or_succeed(task: &ScheduledTask, registry: &DecisionRegistry) -> TaskOutcome {
    let TaskAction::Branch { decision } = &task.action else {
        return TaskOutcome::Success;
    };
    let Some(decision) = registry.get(decision) else {
        return TaskOutcome::Failed(-1);
    };

    let ctx = RunContext {
        dag_id: task.dag_id.clone(),
        run_id: task.run_id,
        logical_date: task.logical_date,
        task: task.name.clone(),
        attempt: task.attempt,
    };
    match decision.decide(&ctx).await {
        Ok(selection) => TaskOutcome::Branched(selection),
        Err(_) => TaskOutcome::Failed(-1),
    }
}
