// src/schedule.rs

//! Schedule intervals and due-run computation.
//!
//! A run is identified by its *logical date*: the start of the interval it
//! covers. The run for interval `[d, d + interval)` becomes due at
//! `d + interval`. Preset schedules align to UTC wall-clock boundaries
//! (`@hourly` to the hour, `@daily` to midnight, `@weekly` to Monday
//! midnight); fixed durations align to the DAG's `start_date`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::types::parse_duration;

/// Longest fixed interval accepted from configuration. Keeps interval
/// arithmetic on logical dates within chrono's range.
pub const MAX_INTERVAL: Duration = Duration::from_secs(100 * 366 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// A single run, at `start_date`.
    Once,
    Hourly,
    Daily,
    Weekly,
    /// Fixed interval measured from `start_date`.
    Every(Duration),
}

impl Schedule {
    /// Length of one interval, or `None` for `@once`.
    pub fn interval(&self) -> Option<TimeDelta> {
        match self {
            Schedule::Once => None,
            Schedule::Hourly => Some(TimeDelta::hours(1)),
            Schedule::Daily => Some(TimeDelta::days(1)),
            Schedule::Weekly => Some(TimeDelta::weeks(1)),
            Schedule::Every(d) => TimeDelta::from_std(*d).ok(),
        }
    }

    fn origin(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            // 1970-01-05 was a Monday.
            Schedule::Weekly => DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(4),
            Schedule::Every(_) => start,
            _ => DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Latest interval boundary at or before `t`.
    fn floor(&self, t: DateTime<Utc>, start: DateTime<Utc>, step: TimeDelta) -> DateTime<Utc> {
        let origin = self.origin(start);
        let step_ms = step.num_milliseconds().max(1);
        let elapsed_ms = (t - origin).num_milliseconds();
        origin + TimeDelta::milliseconds(elapsed_ms.div_euclid(step_ms) * step_ms)
    }

    /// Earliest interval boundary at or after `t`.
    fn ceil(&self, t: DateTime<Utc>, start: DateTime<Utc>, step: TimeDelta) -> DateTime<Utc> {
        let floored = self.floor(t, start, step);
        if floored < t { floored + step } else { floored }
    }

    /// Logical dates that should be run at `now`.
    ///
    /// `last` is the logical date of the most recently requested run, if any.
    /// Without `catchup` at most one (the latest) logical date is returned.
    pub fn due_logical_dates(
        &self,
        start: DateTime<Utc>,
        last: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        catchup: bool,
    ) -> Vec<DateTime<Utc>> {
        let Some(step) = self.interval() else {
            return if last.is_none() && start <= now {
                vec![start]
            } else {
                Vec::new()
            };
        };

        let first = self.ceil(start, start, step);
        let latest = self.floor(now, start, step) - step;
        if latest < first {
            return Vec::new();
        }

        let lower = match last {
            Some(l) => l + step,
            None => first,
        };
        if latest < lower {
            return Vec::new();
        }

        if !catchup {
            return vec![latest];
        }

        let mut dates = Vec::new();
        let mut d = lower;
        while d <= latest {
            dates.push(d);
            d += step;
        }
        dates
    }

    /// When the next interval closes after `now`, or `None` for `@once`.
    pub fn next_wakeup(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let step = self.interval()?;
        let next = self.floor(now, start, step) + step;
        Some(next.max(self.ceil(start, start, step) + step))
    }

    /// Logical date of the most recently closed interval at `now`, used for
    /// manually requested runs.
    pub fn latest_logical_date(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.interval() {
            Some(step) => self.floor(now, start, step) - step,
            None => start,
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Once => f.write_str("@once"),
            Schedule::Hourly => f.write_str("@hourly"),
            Schedule::Daily => f.write_str("@daily"),
            Schedule::Weekly => f.write_str("@weekly"),
            Schedule::Every(d) => write!(f, "every {:?}", d),
        }
    }
}

impl FromStr for Schedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "@once" => Ok(Schedule::Once),
            "@hourly" => Ok(Schedule::Hourly),
            "@daily" => Ok(Schedule::Daily),
            "@weekly" => Ok(Schedule::Weekly),
            other => {
                let d = parse_duration(other)
                    .map_err(|e| format!("invalid schedule '{}': {}", s, e))?;
                if d.is_zero() {
                    return Err(format!("invalid schedule '{}': interval must be > 0", s));
                }
                if d > MAX_INTERVAL {
                    return Err(format!(
                        "invalid schedule '{}': interval must not exceed {}h",
                        s,
                        MAX_INTERVAL.as_secs() / 3600
                    ));
                }
                Ok(Schedule::Every(d))
            }
        }
    }
}
