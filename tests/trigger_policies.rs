// tests/trigger_policies.rs

use streamdag::config::ConfigFile;
use streamdag::dag::{RunOutcome, Scheduler, TaskRunState};
use streamdag::decision::BranchSelection;
use streamdag::engine::TaskOutcome;
use streamdag::types::TriggerPolicy;
use streamdag_test_utils::{init_tracing, logical_date, ConfigFileBuilder, TaskConfigBuilder};

fn sorted(mut names: Vec<&str>) -> Vec<&str> {
    names.sort_unstable();
    names
}

/// `pick` branches to `left` or `right`. The `leaf_*` tasks hang off `right`
/// only; the `join_*` tasks wait for both branches.
fn branching_config() -> ConfigFile {
    let leaf = |policy| {
        TaskConfigBuilder::shell("true")
            .after("right")
            .trigger_rule(policy)
            .build()
    };
    let join = |policy| {
        TaskConfigBuilder::shell("true")
            .after("left")
            .after("right")
            .trigger_rule(policy)
            .build()
    };

    ConfigFileBuilder::new()
        .with_static_decision("pick_left", &["left"])
        .with_task("pick", TaskConfigBuilder::branch("pick_left").build())
        .with_task("left", TaskConfigBuilder::shell("true").after("pick").build())
        .with_task("right", TaskConfigBuilder::shell("true").after("pick").build())
        .with_task("leaf_all_success", leaf(TriggerPolicy::AllSucceeded))
        .with_task("leaf_none_failed", leaf(TriggerPolicy::NoneFailed))
        .with_task("leaf_min_one_success", leaf(TriggerPolicy::NoneFailedMinOneSuccess))
        .with_task(
            "after_skipped_leaf",
            TaskConfigBuilder::shell("true")
                .after("leaf_all_success")
                .trigger_rule(TriggerPolicy::NoneFailed)
                .build(),
        )
        .with_task("join_all_success", join(TriggerPolicy::AllSucceeded))
        .with_task("join_none_failed", join(TriggerPolicy::NoneFailed))
        .with_task("join_min_one_success", join(TriggerPolicy::NoneFailedMinOneSuccess))
        .build()
}

fn scheduler_after_pick() -> (Scheduler, Vec<String>, Vec<String>) {
    let cfg = branching_config();
    let mut scheduler = Scheduler::from_config(&cfg);

    let step = scheduler.start_new_run(logical_date());
    assert_eq!(step.scheduled_names(), vec!["pick"]);

    let step = scheduler.step_completion("pick", TaskOutcome::Branched(BranchSelection::one("left")));
    let scheduled = step.scheduled_names().into_iter().map(str::to_string).collect();
    (scheduler, scheduled, step.newly_skipped)
}

#[test]
fn skip_reaches_grandchildren_according_to_policy() {
    init_tracing();
    let (scheduler, scheduled, skipped) = scheduler_after_pick();

    assert_eq!(scheduler.run_state_of("right"), Some(TaskRunState::Skipped));

    // Every upstream of the leaves was skipped.
    assert_eq!(scheduler.run_state_of("leaf_all_success"), Some(TaskRunState::Skipped));
    assert_eq!(scheduler.run_state_of("leaf_min_one_success"), Some(TaskRunState::Skipped));
    assert_eq!(scheduler.run_state_of("leaf_none_failed"), Some(TaskRunState::Running));

    // A skip two levels down still satisfies `none_failed`.
    assert_eq!(scheduler.run_state_of("after_skipped_leaf"), Some(TaskRunState::Running));

    assert_eq!(
        sorted(scheduled.iter().map(String::as_str).collect()),
        vec!["after_skipped_leaf", "leaf_none_failed", "left"]
    );
    assert!(skipped.contains(&"leaf_all_success".to_string()));
    assert!(skipped.contains(&"leaf_min_one_success".to_string()));
    assert!(!skipped.contains(&"leaf_none_failed".to_string()));
}

#[test]
fn joins_over_a_skipped_branch_follow_their_policy() {
    init_tracing();
    let (mut scheduler, _, _) = scheduler_after_pick();

    // The joins wait for `left`, which is still running.
    assert_eq!(scheduler.run_state_of("join_all_success"), Some(TaskRunState::Pending));
    assert_eq!(scheduler.run_state_of("join_none_failed"), Some(TaskRunState::Pending));

    let step = scheduler.step_completion("left", TaskOutcome::Success);
    assert_eq!(
        sorted(step.scheduled_names()),
        vec!["join_min_one_success", "join_none_failed"]
    );
    assert_eq!(step.newly_skipped, vec!["join_all_success".to_string()]);

    let mut finished = None;
    for task in ["leaf_none_failed", "after_skipped_leaf", "join_none_failed", "join_min_one_success"] {
        finished = scheduler.step_completion(task, TaskOutcome::Success).finished.or(finished);
    }

    let summary = finished.expect("run finished");
    assert_eq!(summary.outcome, RunOutcome::Success);
    assert_eq!(
        sorted(summary.tasks_in(TaskRunState::Skipped)),
        vec!["join_all_success", "leaf_all_success", "leaf_min_one_success", "right"]
    );
}

#[test]
fn none_failed_still_propagates_upstream_failure() {
    init_tracing();
    let (mut scheduler, _, _) = scheduler_after_pick();

    scheduler.step_completion("left", TaskOutcome::Failed(1));

    assert_eq!(scheduler.run_state_of("left"), Some(TaskRunState::Failed));
    assert_eq!(scheduler.run_state_of("join_none_failed"), Some(TaskRunState::UpstreamFailed));
    assert_eq!(scheduler.run_state_of("join_all_success"), Some(TaskRunState::UpstreamFailed));
}
