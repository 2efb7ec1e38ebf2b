// src/engine/ticker.rs

//! Turns the DAG's schedule into `RunRequested` events.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::model::DagSpec;
use crate::engine::{RuntimeEvent, TriggerReason};

/// Handle for the schedule ticker.
///
/// Dropping this handle stops the ticker.
pub struct TickerHandle {
    inner: JoinHandle<()>,
}

impl TickerHandle {
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.inner.abort();
    }
}

impl std::fmt::Debug for TickerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickerHandle").finish()
    }
}

/// Spawn a background task that requests a run every time an interval of
/// `dag.schedule` closes.
///
/// - On startup, missed intervals since `dag.start_date` are requested when
///   `dag.catchup` is set; otherwise only the most recent one.
/// - `@once` requests a single run for `start_date` and then stops.
pub fn spawn_ticker(dag: DagSpec, runtime_tx: mpsc::Sender<RuntimeEvent>) -> TickerHandle {
    let inner = tokio::spawn(async move {
        info!(
            dag_id = %dag.id,
            schedule = %dag.schedule,
            catchup = dag.catchup,
            start_date = %dag.start_date,
            "schedule ticker started"
        );

        let mut last: Option<DateTime<Utc>> = None;

        loop {
            let now = Utc::now();
            let due = dag
                .schedule
                .due_logical_dates(dag.start_date, last, now, dag.catchup);

            for logical_date in due {
                debug!(%logical_date, "interval closed; requesting run");
                let event = RuntimeEvent::RunRequested {
                    logical_date,
                    reason: TriggerReason::Schedule,
                };
                if runtime_tx.send(event).await.is_err() {
                    debug!("runtime gone; stopping schedule ticker");
                    return;
                }
                last = Some(logical_date);
            }

            let wake_at = match dag.schedule.next_wakeup(dag.start_date, now) {
                Some(at) => at,
                // `@once`: wait for the start date if it is still ahead.
                None if last.is_none() => dag.start_date,
                None => break,
            };

            let wait = (wake_at - now).to_std().unwrap_or_default();
            debug!(wake_at = %wake_at, ?wait, "schedule ticker sleeping");
            tokio::time::sleep(wait).await;
        }

        debug!("schedule ticker finished");
    });

    TickerHandle { inner }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::validate::dag_spec_for_tests;
    use crate::schedule::Schedule;
    use chrono::TimeDelta;

    #[tokio::test]
    async fn once_schedule_requests_single_run() {
        let mut dag = dag_spec_for_tests();
        dag.schedule = Schedule::Once;
        dag.start_date = Utc::now() - TimeDelta::hours(1);
        let start = dag.start_date;

        let (tx, mut rx) = mpsc::channel(8);
        let handle = spawn_ticker(dag, tx);

        match rx.recv().await {
            Some(RuntimeEvent::RunRequested { logical_date, reason }) => {
                assert_eq!(logical_date, start);
                assert_eq!(reason, TriggerReason::Schedule);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // The ticker stops after the single run and drops its sender.
        assert!(rx.recv().await.is_none());
        drop(handle);
    }

    #[tokio::test]
    async fn without_catchup_only_latest_interval_is_requested() {
        let mut dag = dag_spec_for_tests();
        dag.schedule = Schedule::Hourly;
        dag.catchup = false;
        dag.start_date = Utc::now() - TimeDelta::days(2);

        let (tx, mut rx) = mpsc::channel(64);
        let _handle = spawn_ticker(dag.clone(), tx);

        let expected = dag.schedule.latest_logical_date(dag.start_date, Utc::now());
        match rx.recv().await {
            Some(RuntimeEvent::RunRequested { logical_date, .. }) => {
                // An hour boundary may pass between the two clock reads.
                let hour = TimeDelta::hours(1);
                assert!([expected - hour, expected, expected + hour].contains(&logical_date));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }
}
