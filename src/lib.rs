// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod decision;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod pipeline;
pub mod schedule;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::config::parse_start_date;
use crate::dag::{DagGraph, RunOutcome, Scheduler};
use crate::decision::DecisionRegistry;
use crate::engine::{
    spawn_ticker, CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, TriggerReason,
};
use crate::exec::RealExecutorBackend;
use crate::schedule::Schedule;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - scheduler / run queue / runtime
/// - executor and decision registry
/// - the schedule ticker (or a single run for `--once`)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let scheduler = Scheduler::from_config(&cfg);
    let registry = Arc::new(DecisionRegistry::from_config(&cfg));

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let executor = RealExecutorBackend::new(rt_tx.clone(), registry);

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    // Either a single manual run, or follow the schedule.
    let _ticker = if args.once {
        let logical_date = match args.logical_date.as_deref() {
            Some(s) => parse_start_date(s)?,
            None => cfg
                .dag
                .schedule
                .latest_logical_date(cfg.dag.start_date, Utc::now()),
        };
        info!(%logical_date, "requesting a single manual run");
        rt_tx
            .send(RuntimeEvent::RunRequested {
                logical_date,
                reason: TriggerReason::Manual,
            })
            .await?;
        None
    } else {
        Some(spawn_ticker(cfg.dag.clone(), rt_tx.clone()))
    };

    let options = RuntimeOptions {
        exit_when_idle: args.once || cfg.dag.schedule == Schedule::Once,
    };

    // Construct the pure core runtime (single source of truth for semantics).
    let core = CoreRuntime::new(scheduler, cfg.dag.overlap, cfg.dag.max_queued_runs, options);

    // Construct the async IO shell around the core.
    let runtime = Runtime::new(core, rt_rx, rt_tx, executor);
    let summaries = runtime.run().await?;

    let failed: Vec<u64> = summaries
        .iter()
        .filter(|s| s.outcome == RunOutcome::Failed)
        .map(|s| s.run_id)
        .collect();

    if args.once && !failed.is_empty() {
        bail!("DAG run failed (run ids: {:?})", failed);
    }

    Ok(())
}

/// Dry-run output: DAG metadata, tasks with their policies, and the
/// topological order.
fn print_dry_run(cfg: &ConfigFile) {
    println!("streamdag dry-run");
    println!("  dag.id = {}", cfg.dag.id);
    println!("  dag.owner = {}", cfg.dag.owner);
    println!("  dag.schedule = {}", cfg.dag.schedule);
    println!("  dag.start_date = {}", cfg.dag.start_date);
    println!("  dag.catchup = {}", cfg.dag.catchup);
    println!("  dag.overlap = {:?}", cfg.dag.overlap);
    println!("  dag.max_queued_runs = {}", cfg.dag.max_queued_runs);
    println!();

    println!("tasks ({}):", cfg.task.len());
    for (name, task) in cfg.task.iter() {
        println!("  - {name}");
        println!("      kind: {:?}", task.action.kind());
        match &task.action {
            types::TaskAction::Shell { cmd } => println!("      cmd: {cmd}"),
            types::TaskAction::Branch { decision } => println!("      decision: {decision}"),
            types::TaskAction::Empty => {}
        }
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        println!("      trigger_rule: {}", task.trigger_policy);
        println!(
            "      retries: {} (delay {:?})",
            task.retries, task.retry_delay
        );
        if let Some(timeout) = task.execution_timeout {
            println!("      execution_timeout: {timeout:?}");
        }
    }

    let graph = DagGraph::from_config(cfg);
    if let Some(order) = graph.topological_order() {
        println!();
        println!("topological order: {}", order.join(" -> "));
    }

    debug!("dry-run complete (no execution)");
}
