// tests/config_loading.rs

use std::io::Write;
use std::path::PathBuf;

use streamdag::config::load_and_validate;
use streamdag::errors::StreamdagError;
use streamdag::pipeline;
use streamdag::schedule::Schedule;
use streamdag_test_utils::init_tracing;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn shipped_config_matches_builtin_pipeline() {
    init_tracing();
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Streamdag.toml");

    let loaded = load_and_validate(&path).unwrap();
    let built = pipeline::streaming_data_processing_dag().unwrap();

    assert_eq!(loaded.dag, built.dag);
    assert_eq!(loaded.task, built.task);
    assert_eq!(loaded.decision, built.decision);
    assert_eq!(loaded.dag.schedule, Schedule::Daily);
}

#[test]
fn shipped_sinks_spell_their_trigger_rule_the_same_way() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Streamdag.toml");
    let text = std::fs::read_to_string(path).unwrap();
    let raw: streamdag::config::RawConfigFile = toml::from_str(&text).unwrap();

    let rules: Vec<&str> = text
        .lines()
        .filter_map(|line| line.trim().strip_prefix("trigger_rule = "))
        .collect();
    assert_eq!(rules, vec![r#""none_failed_min_one_success""#; pipeline::SINKS.len()]);

    for sink in pipeline::SINKS {
        assert_eq!(
            raw.task[sink].trigger_rule,
            streamdag::types::TriggerPolicy::NoneFailedMinOneSuccess
        );
    }
}

#[test]
fn cycle_is_rejected() {
    let file = write_config(
        r#"
[task.a]
cmd = "true"
after = ["b"]

[task.b]
cmd = "true"
after = ["a"]
"#,
    );

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, StreamdagError::DagCycle(_)), "got {err:?}");
}

#[test]
fn branch_to_non_downstream_task_is_rejected() {
    let file = write_config(
        r#"
[task.decide]
kind = "branch"
decision = "pick"

[task.left]
kind = "empty"
after = ["decide"]

[task.elsewhere]
cmd = "true"

[decision.pick]
type = "static"
follow = ["elsewhere"]
"#,
    );

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, StreamdagError::ConfigError(ref m) if m.contains("elsewhere")), "got {err:?}");
}

#[test]
fn unknown_trigger_rule_is_a_toml_error() {
    let file = write_config(
        r#"
[task.a]
cmd = "true"
trigger_rule = "one_success"
"#,
    );

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, StreamdagError::TomlError(_)), "got {err:?}");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_and_validate(dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, StreamdagError::IoError(_)), "got {err:?}");
}

#[test]
fn defaults_apply_to_tasks_without_overrides() {
    let file = write_config(
        r#"
[dag]
schedule = "30m"
start_date = "2024-01-01T00:00:00"

[default]
retries = 3
retry_delay = "2s"
execution_timeout = "1m"

[task.a]
cmd = "true"

[task.b]
cmd = "true"
after = ["a"]
retries = 0
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    let a = &cfg.task["a"];
    assert_eq!(a.retries, 3);
    assert_eq!(a.retry_delay, std::time::Duration::from_secs(2));
    assert_eq!(a.execution_timeout, Some(std::time::Duration::from_secs(60)));
    assert_eq!(cfg.task["b"].max_attempts(), 1);
    assert_eq!(cfg.dag.schedule, Schedule::Every(std::time::Duration::from_secs(1800)));
}
