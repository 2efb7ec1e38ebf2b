// src/engine/queue.rs

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::types::OverlapBehaviour;

/// Runs that became due while another run was active.
///
/// Semantics:
/// - Each entry is the logical date of one future run.
/// - `max_runs` bounds how many are remembered; in `Queue` mode the oldest
///   entries are dropped first.
/// - In `Replace` mode only the most recent due run is kept.
/// - Requests for a logical date that is already queued are coalesced.
#[derive(Debug)]
pub struct RunQueue {
    behaviour: OverlapBehaviour,
    max_runs: usize,
    runs: VecDeque<DateTime<Utc>>,
}

impl RunQueue {
    /// Create a new queue with the given behaviour and maximum queued runs.
    ///
    /// `max_runs` is clamped to at least 1.
    pub fn new(behaviour: OverlapBehaviour, max_runs: usize) -> Self {
        Self {
            behaviour,
            max_runs: max_runs.max(1),
            runs: VecDeque::new(),
        }
    }

    /// Returns true if there are no queued runs.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Remember a run that became due while another run is active.
    pub fn record(&mut self, logical_date: DateTime<Utc>) {
        if self.runs.contains(&logical_date) {
            debug!(%logical_date, "run already queued; coalescing");
            return;
        }

        match self.behaviour {
            OverlapBehaviour::Queue => {
                self.runs.push_back(logical_date);
                debug!(%logical_date, queued = self.runs.len(), "queued run (queue mode)");

                if self.runs.len() > self.max_runs {
                    warn!(
                        queued = self.runs.len(),
                        max_runs = self.max_runs,
                        "exceeded max_queued_runs; dropping oldest queued runs"
                    );
                    while self.runs.len() > self.max_runs {
                        self.runs.pop_front();
                    }
                }
            }
            OverlapBehaviour::Replace => {
                debug!(%logical_date, "replacing queued runs with latest (replace mode)");
                self.runs.clear();
                self.runs.push_back(logical_date);
            }
        }
    }

    /// Take the next queued run, oldest first.
    pub fn pop_next(&mut self) -> Option<DateTime<Utc>> {
        self.runs.pop_front()
    }
}
