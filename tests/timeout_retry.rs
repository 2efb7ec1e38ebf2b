// tests/timeout_retry.rs
#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use streamdag::config::ConfigFile;
use streamdag::dag::{RunOutcome, TaskRunState};
use streamdag::decision::DecisionRegistry;
use streamdag::engine::{Runtime, RuntimeEvent};
use streamdag::exec::RealExecutorBackend;
use streamdag::types::TriggerPolicy;
use streamdag_test_utils::{init_tracing, once_core, request_run, ConfigFileBuilder, TaskConfigBuilder};

fn config(slow_cmd: &str, downstream_cmd: &str) -> ConfigFile {
    ConfigFileBuilder::new()
        .with_task(
            "slow",
            TaskConfigBuilder::shell(slow_cmd)
                .retries(1)
                .retry_delay("10ms")
                .timeout("200ms")
                .build(),
        )
        .with_task(
            "after_slow",
            TaskConfigBuilder::shell(downstream_cmd)
                .after("slow")
                .trigger_rule(TriggerPolicy::NoneFailedMinOneSuccess)
                .build(),
        )
        .build()
}

async fn run_once(cfg: &ConfigFile) -> Vec<streamdag::dag::RunSummary> {
    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = RealExecutorBackend::new(tx.clone(), Arc::new(DecisionRegistry::new()));
    request_run(&tx).await;

    tokio::time::timeout(
        Duration::from_secs(10),
        Runtime::new(once_core(cfg), rx, tx, executor).run(),
    )
    .await
    .expect("run finished in time")
    .expect("runtime ok")
}

fn attempts_recorded(path: &std::path::Path) -> usize {
    std::fs::read_to_string(path).unwrap_or_default().lines().count()
}

#[tokio::test]
async fn timed_out_attempts_are_retried_then_failed() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let attempts = dir.path().join("attempts");
    let ran_downstream = dir.path().join("downstream");

    let cfg = config(
        &format!("echo $STREAMDAG_TRY_NUMBER >> {}; sleep 5", attempts.display()),
        &format!("touch {}", ran_downstream.display()),
    );

    let started = Instant::now();
    let summaries = run_once(&cfg).await;

    assert!(started.elapsed() < Duration::from_secs(4), "timed-out processes were killed");
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].outcome, RunOutcome::Failed);
    assert_eq!(summaries[0].state_of("slow"), Some(TaskRunState::Failed));
    assert_eq!(summaries[0].state_of("after_slow"), Some(TaskRunState::UpstreamFailed));
    assert_eq!(attempts_recorded(&attempts), 2);
    assert!(!ran_downstream.exists());
}

#[tokio::test]
async fn retry_after_timeout_can_succeed() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let ran_downstream = dir.path().join("downstream");

    let cfg = config(
        &format!(
            "if [ -f {m} ]; then exit 0; else touch {m}; sleep 5; fi",
            m = marker.display()
        ),
        &format!("touch {}", ran_downstream.display()),
    );

    let summaries = run_once(&cfg).await;

    assert_eq!(summaries[0].outcome, RunOutcome::Success);
    assert_eq!(summaries[0].state_of("slow"), Some(TaskRunState::Success));
    assert_eq!(summaries[0].state_of("after_slow"), Some(TaskRunState::Success));
    assert!(ran_downstream.exists());
}

#[tokio::test]
async fn timed_out_attempt_stops_the_work_its_shell_started() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let late = dir.path().join("late");

    let cfg = ConfigFileBuilder::new()
        .with_task(
            "slow",
            TaskConfigBuilder::shell(&format!("(sleep 1; touch {}); true", late.display()))
                .timeout("200ms")
                .build(),
        )
        .build();

    let summaries = run_once(&cfg).await;
    assert_eq!(summaries[0].state_of("slow"), Some(TaskRunState::Failed));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!late.exists(), "work of a timed-out attempt kept running");
}

#[tokio::test]
async fn shutdown_stops_running_attempts() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let late = dir.path().join("late");

    let cfg = ConfigFileBuilder::new()
        .with_task(
            "long",
            TaskConfigBuilder::shell(&format!("sleep 1; touch {}", late.display())).build(),
        )
        .build();

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = RealExecutorBackend::new(tx.clone(), Arc::new(DecisionRegistry::new()));
    request_run(&tx).await;

    let shutdown_tx = tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = shutdown_tx.send(RuntimeEvent::ShutdownRequested).await;
    });

    let summaries = tokio::time::timeout(
        Duration::from_secs(5),
        Runtime::new(once_core(&cfg), rx, tx, executor).run(),
    )
    .await
    .expect("runtime stopped in time")
    .expect("runtime ok");
    assert!(summaries.is_empty());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!late.exists(), "attempt kept running after shutdown");
}
