use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use paropt::optimizer::{GridSearch, RandomSearch, StopPolicy, StopReason};
use paropt::runner::LOG_FILE;
use paropt::storage::{MemoryStorage, Storage};
use paropt::template::RunConfig;
use paropt::{Error, ObjectiveResult, RunState, Runner};

use crate::{sleeper, x_of};

fn negative_x(run: &RunConfig, _timeout: Option<Duration>) -> paropt::Result<ObjectiveResult> {
    Ok(ObjectiveResult::success(run.command.clone(), -x_of(run)))
}

#[test]
fn grid_run_finds_the_minimum_runtime() {
    let logs = tempfile::tempdir().unwrap();
    let storage = MemoryStorage::new();
    let mut runner = Runner::builder(sleeper(), GridSearch::new(vec![3]), storage.clone(), negative_x)
        .logs_root(logs.path())
        .warmup(false)
        .build()
        .unwrap();
    assert_eq!(runner.state(), RunState::Init);
    assert_eq!(runner.run_number(), 0);

    let result = runner.run();
    assert!(result.success, "{result:?}");
    assert_eq!(runner.state(), RunState::Done);
    assert_eq!(result.stop_reason, Some(StopReason::Exhausted));
    assert_eq!(result.message.len(), 3);
    assert!(result.message["0/0/x=5"].starts_with("ok"));

    let (best, outcome) = runner.get_max().unwrap();
    assert_eq!(best[0].cast().as_f64(), 0.0);
    assert_eq!(outcome, 0.0);

    let experiment_id = runner.experiment().id.unwrap();
    let trials = storage.trials(experiment_id).unwrap();
    assert_eq!(trials.len(), 3);
    assert!(trials.iter().all(|t| t.run_number == 0 && t.id.is_some()));

    assert!(runner.run_dir().ends_with("sleeper_0/run_000"));
    assert!(runner.run_dir().join("scripts").is_dir());
    let log = std::fs::read_to_string(runner.log_path()).unwrap();
    assert!(runner.log_path().ends_with(LOG_FILE));
    assert!(log.contains("trial saved"));
    runner.cleanup();
}

#[test]
fn second_session_resumes_the_same_experiment() {
    let logs = tempfile::tempdir().unwrap();
    let storage = MemoryStorage::new();

    let mut first = Runner::builder(sleeper(), GridSearch::new(vec![3]), storage.clone(), negative_x)
        .logs_root(logs.path())
        .warmup(false)
        .build()
        .unwrap();
    first.run();
    first.cleanup();

    let mut second = Runner::builder(sleeper(), GridSearch::new(vec![2]), storage.clone(), negative_x)
        .logs_root(logs.path())
        .warmup(false)
        .build()
        .unwrap();
    assert_eq!(second.run_number(), 1);
    assert_eq!(second.experiment().id, Some(0));

    let result = second.run();
    assert!(result.success);
    assert_eq!(second.optimizer().registered(), 5);
    assert_eq!(storage.trials(0).unwrap().len(), 5);
    assert_eq!(storage.experiment_count(), 1);
    assert!(logs.path().join("sleeper_0/run_001").is_dir());
    second.cleanup();
}

#[test]
fn existing_run_directory_is_a_conflict() {
    let logs = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(logs.path().join("sleeper_0/run_000")).unwrap();

    let err = Runner::builder(sleeper(), GridSearch::new(vec![3]), MemoryStorage::new(), negative_x)
        .logs_root(logs.path())
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::DirectoryConflict(path) if path.ends_with("run_000")));
}

#[test]
fn invalid_experiment_fails_at_build() {
    let logs = tempfile::tempdir().unwrap();
    let bad = sleeper().parameter(paropt::parameter::Parameter::float("x", 0.0, 1.0));
    let err = Runner::builder(bad, RandomSearch::new(2), MemoryStorage::new(), negative_x)
        .logs_root(logs.path())
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateParameter(name) if name == "x"));
}

#[test]
fn warm_up_runs_once_with_extended_timeout() {
    let logs = tempfile::tempdir().unwrap();
    let timeouts = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&timeouts);
    let objective = move |run: &RunConfig, timeout: Option<Duration>| -> paropt::Result<ObjectiveResult> {
        seen.lock().push(timeout);
        Ok(ObjectiveResult::success("", -x_of(run)))
    };

    let mut runner = Runner::builder(sleeper(), GridSearch::new(vec![3]), MemoryStorage::new(), objective)
        .logs_root(logs.path())
        .timeout(Duration::from_secs(2))
        .warmup_factor(3.0)
        .build()
        .unwrap();
    runner.run();

    let timeouts = timeouts.lock();
    assert_eq!(timeouts.len(), 4);
    assert_eq!(timeouts[0], Some(Duration::from_secs(6)));
    assert!(timeouts[1..].iter().all(|t| *t == Some(Duration::from_secs(2))));
}

#[test]
fn budget_ends_the_run_early() {
    let logs = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let objective = move |_run: &RunConfig, _t: Option<Duration>| -> paropt::Result<ObjectiveResult> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(ObjectiveResult::success("", -3.0 / 86_400.0))
    };
    let search = RandomSearch::builder()
        .n_iter(50)
        .seed(4)
        .policy(StopPolicy::default().budget(10.0))
        .build();

    let mut runner = Runner::builder(
        sleeper().parameter(paropt::parameter::Parameter::float("y", 0.0, 1.0)),
        search,
        MemoryStorage::new(),
        objective,
    )
    .logs_root(logs.path())
    .warmup(false)
    .build()
    .unwrap();

    let result = runner.run();
    assert!(result.success);
    assert_eq!(result.stop_reason, Some(StopReason::Budget));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(runner.run().message.len(), 0);
}
