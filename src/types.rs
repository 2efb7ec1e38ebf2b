use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Rule deciding whether a task may run, given the terminal states of its
/// direct upstream tasks in the current run.
///
/// Policies only apply once *every* direct upstream task is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Every upstream task succeeded. A failed upstream yields
    /// `UpstreamFailed`; otherwise a skipped upstream yields `Skipped`.
    #[default]
    #[serde(rename = "all_success")]
    AllSucceeded,
    /// No upstream task failed. Skipped upstreams count as satisfied, even
    /// if all of them were skipped.
    NoneFailed,
    /// No upstream task failed and at least one succeeded. If every upstream
    /// was skipped the task is skipped as well.
    #[serde(alias = "none_failed_or_skipped")]
    NoneFailedMinOneSuccess,
}

impl TriggerPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerPolicy::AllSucceeded => "all_success",
            TriggerPolicy::NoneFailed => "none_failed",
            TriggerPolicy::NoneFailedMinOneSuccess => "none_failed_min_one_success",
        }
    }
}

impl fmt::Display for TriggerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all_success" => Ok(TriggerPolicy::AllSucceeded),
            "none_failed" => Ok(TriggerPolicy::NoneFailed),
            "none_failed_min_one_success" | "none_failed_or_skipped" => {
                Ok(TriggerPolicy::NoneFailedMinOneSuccess)
            }
            other => Err(format!(
                "invalid trigger_rule: {other} (expected \"all_success\", \"none_failed\" or \"none_failed_min_one_success\")"
            )),
        }
    }
}

/// Behaviour when a run becomes due while another run is still active.
///
/// - `Queue`: remember the due run and start it when the active one finishes
///   (bounded by `max_queued_runs`, oldest dropped first).
/// - `Replace`: keep only the most recent due run in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapBehaviour {
    #[default]
    Queue,
    Replace,
}

impl FromStr for OverlapBehaviour {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queue" => Ok(OverlapBehaviour::Queue),
            "replace" => Ok(OverlapBehaviour::Replace),
            other => Err(format!(
                "invalid overlap: {other} (expected \"queue\" or \"replace\")"
            )),
        }
    }
}

/// Kind of a task as written in `[task.<id>] kind = "..."`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    Shell,
    Branch,
    Empty,
}

/// What a task does when it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAction {
    /// Opaque shell command line.
    Shell { cmd: String },
    /// Consult the named decision and follow the branches it selects.
    Branch { decision: String },
    /// No-op placeholder, resolved by the scheduler without dispatch.
    Empty,
}

impl TaskAction {
    pub fn shell(cmd: impl Into<String>) -> Self {
        TaskAction::Shell { cmd: cmd.into() }
    }

    pub fn branch(decision: impl Into<String>) -> Self {
        TaskAction::Branch {
            decision: decision.into(),
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            TaskAction::Shell { .. } => TaskKind::Shell,
            TaskAction::Branch { .. } => TaskKind::Branch,
            TaskAction::Empty => TaskKind::Empty,
        }
    }
}

/// Parse a duration string such as `"15s"`, `"20m"` or `"250ms"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{}' is too large", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_policy_accepts_legacy_join_name() {
        assert_eq!(
            "none_failed_or_skipped".parse::<TriggerPolicy>(),
            Ok(TriggerPolicy::NoneFailedMinOneSuccess)
        );
        assert!("one_success".parse::<TriggerPolicy>().is_err());
    }

    #[test]
    fn parse_duration_rejects_overflow() {
        let err = parse_duration("307445734561825861m").unwrap_err();
        assert!(err.contains("too large"), "{err}");
        assert!(parse_duration("5124095576030432h").is_err());
        assert_eq!(
            parse_duration("307445734561825860m"),
            Ok(Duration::from_secs(307445734561825860 * 60))
        );
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("15s"), Ok(Duration::from_secs(15)));
        assert_eq!(parse_duration("20m"), Ok(Duration::from_secs(1200)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert!(parse_duration("15").is_err());
        assert!(parse_duration("3d").is_err());
        assert!(parse_duration("").is_err());
    }
}
