use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use paropt::optimizer::GridSearch;
use paropt::storage::{MemoryStorage, Storage};
use paropt::template::RunConfig;
use paropt::trial::FAILED_TRIAL_OUTCOME;
use paropt::{Error, ObjectiveResult, RunState, Runner};

use crate::{sleeper, x_of};

fn failing_at_five(run: &RunConfig, _timeout: Option<Duration>) -> paropt::Result<ObjectiveResult> {
    let x = x_of(run);
    if x == 5.0 {
        Ok(ObjectiveResult {
            returncode: 2,
            stdout: "command script failed:\nboom".to_string(),
            obj_output: FAILED_TRIAL_OUTCOME,
            obj_parameters: Default::default(),
        })
    } else {
        Ok(ObjectiveResult::success("", -x))
    }
}

fn grid_runner(
    logs: &std::path::Path,
    storage: MemoryStorage,
    objective: impl paropt::Objective + 'static,
    save_fail_trial: bool,
) -> Runner {
    Runner::builder(sleeper(), GridSearch::new(vec![3]), storage, objective)
        .logs_root(logs)
        .warmup(false)
        .save_fail_trial(save_fail_trial)
        .build()
        .unwrap()
}

#[test]
fn failed_trial_is_dropped_by_default() {
    let logs = tempfile::tempdir().unwrap();
    let storage = MemoryStorage::new();
    let mut runner = grid_runner(logs.path(), storage.clone(), failing_at_five, false);

    let result = runner.run();
    assert!(!result.success);
    assert_eq!(result.message.len(), 3);
    let entry = &result.message["0/0/x=5"];
    assert!(entry.starts_with("failed"), "{entry}");
    assert!(entry.contains("boom"));
    assert_eq!(storage.trials(0).unwrap().len(), 2);
    assert_eq!(runner.state(), RunState::Done);
}

#[test]
fn failed_trial_is_saved_with_sentinel_when_requested() {
    let logs = tempfile::tempdir().unwrap();
    let storage = MemoryStorage::new();
    let mut runner = grid_runner(logs.path(), storage.clone(), failing_at_five, true);

    let result = runner.run();
    assert!(!result.success);
    let trials = storage.trials(0).unwrap();
    assert_eq!(trials.len(), 3);
    let failed: Vec<_> = trials.iter().filter(|t| t.is_failure()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].outcome, FAILED_TRIAL_OUTCOME);
    assert!(failed[0].obj_parameters.contains_key("error"));
    assert_eq!(runner.get_max().unwrap().1, 0.0);
}

#[test]
fn timeout_is_persisted_and_learned() {
    let logs = tempfile::tempdir().unwrap();
    let storage = MemoryStorage::new();
    let objective = |run: &RunConfig, timeout: Option<Duration>| -> paropt::Result<ObjectiveResult> {
        let x = x_of(run);
        if x == 10.0 {
            let limit = timeout.unwrap_or(Duration::from_secs(1));
            Ok(ObjectiveResult::timeout(-limit.as_secs_f64() / 86_400.0)
                .with_parameter("timeout_secs", serde_json::json!(limit.as_secs_f64())))
        } else {
            Ok(ObjectiveResult::success("", -x))
        }
    };
    let mut runner = grid_runner(logs.path(), storage.clone(), objective, false);

    let result = runner.run();
    assert!(!result.success);
    let entry = &result.message["0/0/x=10"];
    assert!(entry.starts_with("timeout"), "{entry}");
    assert!(entry.contains("timed out after 1s for config x=10"), "{entry}");
    let trials = storage.trials(0).unwrap();
    assert_eq!(trials.len(), 3);
    assert_eq!(runner.optimizer().registered(), 3);
}

#[test]
fn unreadable_output_is_a_trial_failure() {
    let logs = tempfile::tempdir().unwrap();
    let storage = MemoryStorage::new();
    let objective = |run: &RunConfig, _t: Option<Duration>| -> paropt::Result<ObjectiveResult> {
        if x_of(run) == 0.0 {
            Err(Error::ObjectiveOutput("no score".into()))
        } else {
            Ok(ObjectiveResult::success("", 1.0))
        }
    };
    let mut runner = grid_runner(logs.path(), storage.clone(), objective, false);

    let result = runner.run();
    assert!(!result.success);
    assert!(result.message["0/0/x=0"].contains("no score"));
    assert_eq!(storage.trials(0).unwrap().len(), 2);
    assert!(!result.message.contains_key("error"));
}

#[test]
fn fatal_error_stops_the_loop() {
    let logs = tempfile::tempdir().unwrap();
    let storage = MemoryStorage::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let objective = move |_run: &RunConfig, _t: Option<Duration>| -> paropt::Result<ObjectiveResult> {
        if counter.fetch_add(1, Ordering::SeqCst) == 1 {
            Err(Error::Storage("connection lost".into()))
        } else {
            Ok(ObjectiveResult::success("", 0.5))
        }
    };
    let mut runner = grid_runner(logs.path(), storage.clone(), objective, true);

    let result = runner.run();
    assert!(!result.success);
    assert!(result.message["error"].contains("connection lost"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(storage.trials(0).unwrap().len(), 1);
    assert_eq!(runner.state(), RunState::Done);
}

fn always_failing(_run: &RunConfig, _t: Option<Duration>) -> paropt::Result<ObjectiveResult> {
    Ok(ObjectiveResult {
        returncode: 1,
        stdout: "command script failed".to_string(),
        obj_output: FAILED_TRIAL_OUTCOME,
        obj_parameters: Default::default(),
    })
}

#[test]
fn session_without_saved_trials_still_advances_the_run_number() {
    let logs = tempfile::tempdir().unwrap();
    let storage = MemoryStorage::new();

    let mut first = grid_runner(logs.path(), storage.clone(), always_failing, false);
    let result = first.run();
    assert!(!result.success);
    assert_eq!(result.message.len(), 3);
    assert!(storage.trials(0).unwrap().is_empty());
    first.cleanup();

    let built_only = grid_runner(logs.path(), storage.clone(), always_failing, false);
    assert_eq!(built_only.run_number(), 1);
    built_only.cleanup();

    let third = grid_runner(logs.path(), storage.clone(), failing_at_five, false);
    assert_eq!(third.run_number(), 2);
    assert!(third.run_dir().ends_with("sleeper_0/run_002"));
    third.cleanup();
}
