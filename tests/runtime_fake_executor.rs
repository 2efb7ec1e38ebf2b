// tests/runtime_fake_executor.rs

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::mpsc;

use streamdag::config::ConfigFile;
use streamdag::dag::RunOutcome;
use streamdag::engine::{Runtime, RuntimeEvent, TaskOutcome, TriggerReason};
use streamdag::types::OverlapBehaviour;
use streamdag_test_utils::{
    init_tracing, logical_date, once_core, with_timeout, ConfigFileBuilder, FakeExecutor,
    TaskConfigBuilder,
};

/// Very simple chain: A -> B
fn simple_chain_config(overlap: OverlapBehaviour, max_queued_runs: usize) -> ConfigFile {
    ConfigFileBuilder::new()
        .with_overlap(overlap, max_queued_runs)
        .with_task("A", TaskConfigBuilder::shell("echo A").build())
        .with_task("B", TaskConfigBuilder::shell("echo B").after("A").build())
        .build()
}

fn day(n: i64) -> DateTime<Utc> {
    logical_date() + TimeDelta::days(n)
}

async fn request(tx: &mpsc::Sender<RuntimeEvent>, date: DateTime<Utc>) {
    tx.send(RuntimeEvent::RunRequested {
        logical_date: date,
        reason: TriggerReason::Schedule,
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn chain_runs_in_dependency_order() {
    init_tracing();
    let cfg = simple_chain_config(OverlapBehaviour::Queue, 1);

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = FakeExecutor::new(tx.clone());
    let log = executor.log();
    request(&tx, day(0)).await;

    let summaries = with_timeout(Runtime::new(once_core(&cfg), rx, tx, executor).run())
        .await
        .unwrap();

    assert_eq!(log.tasks(), vec!["A", "B"]);
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].outcome, RunOutcome::Success);
    assert_eq!(summaries[0].logical_date, day(0));
}

#[tokio::test]
async fn overlapping_requests_are_queued() {
    init_tracing();
    let cfg = simple_chain_config(OverlapBehaviour::Queue, 2);

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = FakeExecutor::new(tx.clone());
    let log = executor.log();
    for n in 0..3 {
        request(&tx, day(n)).await;
    }

    let summaries = with_timeout(Runtime::new(once_core(&cfg), rx, tx, executor).run())
        .await
        .unwrap();

    let dates: Vec<_> = summaries.iter().map(|s| s.logical_date).collect();
    assert_eq!(dates, vec![day(0), day(1), day(2)]);
    let run_ids: Vec<u64> = summaries.iter().map(|s| s.run_id).collect();
    assert_eq!(run_ids, vec![1, 2, 3]);
    assert_eq!(log.tasks().len(), 6);
}

#[tokio::test]
async fn replace_keeps_only_latest_request() {
    init_tracing();
    let cfg = simple_chain_config(OverlapBehaviour::Replace, 1);

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = FakeExecutor::new(tx.clone());
    for n in 0..3 {
        request(&tx, day(n)).await;
    }

    let summaries = with_timeout(Runtime::new(once_core(&cfg), rx, tx, executor).run())
        .await
        .unwrap();

    let dates: Vec<_> = summaries.iter().map(|s| s.logical_date).collect();
    assert_eq!(dates, vec![day(0), day(2)]);
}

#[tokio::test]
async fn failure_without_retries_fails_run() {
    init_tracing();
    let cfg = simple_chain_config(OverlapBehaviour::Queue, 1);

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = FakeExecutor::new(tx.clone()).script("A", [TaskOutcome::Failed(7)]);
    let log = executor.log();
    request(&tx, day(0)).await;

    let summaries = with_timeout(Runtime::new(once_core(&cfg), rx, tx, executor).run())
        .await
        .unwrap();

    assert_eq!(summaries[0].outcome, RunOutcome::Failed);
    assert_eq!(log.tasks(), vec!["A"]);
}

#[tokio::test]
async fn shutdown_stops_runtime() {
    init_tracing();
    let cfg = simple_chain_config(OverlapBehaviour::Queue, 1);

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = FakeExecutor::new(tx.clone());
    tx.send(RuntimeEvent::ShutdownRequested).await.unwrap();

    let summaries = with_timeout(Runtime::new(once_core(&cfg), rx, tx, executor).run())
        .await
        .unwrap();

    assert!(summaries.is_empty());
}
