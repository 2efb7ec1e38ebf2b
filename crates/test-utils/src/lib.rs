pub mod builders;
pub mod fake_executor;

use std::sync::Once;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use streamdag::config::ConfigFile;
use streamdag::dag::Scheduler;
use streamdag::engine::{CoreRuntime, RuntimeEvent, RuntimeOptions};

pub use builders::{ConfigFileBuilder, TaskConfigBuilder};
pub use fake_executor::{ExecutedAttempt, ExecutionLog, FakeExecutor};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Core runtime for a single `--once` style run of `cfg`.
pub fn once_core(cfg: &ConfigFile) -> CoreRuntime {
    CoreRuntime::new(
        Scheduler::from_config(cfg),
        cfg.dag.overlap,
        cfg.dag.max_queued_runs,
        RuntimeOptions { exit_when_idle: true },
    )
}

/// Fixed logical date used across tests.
pub fn logical_date() -> DateTime<Utc> {
    streamdag::config::parse_start_date("2024-09-17T00:00:00").expect("valid test date")
}

/// Send a manual run request for [`logical_date`].
pub async fn request_run(tx: &mpsc::Sender<RuntimeEvent>) {
    tx.send(RuntimeEvent::RunRequested {
        logical_date: logical_date(),
        reason: streamdag::engine::TriggerReason::Manual,
    })
    .await
    .expect("runtime channel open");
}
