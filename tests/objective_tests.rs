//! Shell objective tests; these run real `bash` scripts.
#![cfg(unix)]

use std::time::{Duration, Instant};

use paropt::experiment::Experiment;
use paropt::objective::{
    AccuracyScore, Objective, ScriptRunner, Scoring, ShellObjective, Stage, TIMEOUT_SENTINEL,
};
use paropt::parameter::Parameter;
use paropt::template::RunConfig;
use paropt::trial::FAILED_TRIAL_OUTCOME;

fn render(experiment: &Experiment, dir: &tempfile::TempDir, point: &[f64]) -> RunConfig {
    let space = experiment.search_space().unwrap();
    RunConfig::render(experiment, &space.to_configs(point), dir.path().join("scripts"))
}

#[test]
fn faster_commands_score_higher() {
    let dir = tempfile::tempdir().unwrap();
    let exp = Experiment::new("sleeper", "sleep ${t}").parameter(Parameter::float("t", 0.0, 1.0));
    let objective = ShellObjective::new(Scoring::Timing);

    let fast = objective.evaluate(&render(&exp, &dir, &[0.05]), None).unwrap();
    let slow = objective.evaluate(&render(&exp, &dir, &[0.4]), None).unwrap();
    assert!(fast.is_success() && slow.is_success());
    assert!(fast.obj_output < 0.0);
    assert!(fast.obj_output > slow.obj_output);
    assert!(slow.obj_parameters["elapsed_secs"].as_f64().unwrap() >= 0.4);
}

#[test]
fn timeout_kills_the_command() {
    let dir = tempfile::tempdir().unwrap();
    let exp = Experiment::new("hang", "sleep 30");
    let start = Instant::now();
    let result = ShellObjective::new(Scoring::Timing)
        .evaluate(&render(&exp, &dir, &[]), Some(Duration::from_millis(200)))
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(result.is_timeout());
    assert_eq!(result.stdout, TIMEOUT_SENTINEL);
    assert!((result.obj_output + 0.2 / 86_400.0).abs() < 1e-12);
    assert!(!result.is_success());
}

#[test]
fn background_children_do_not_hold_the_trial() {
    let dir = tempfile::tempdir().unwrap();
    let exp = Experiment::new("bg", "sleep 5 & echo started");
    let objective = ShellObjective::new(Scoring::Timing);

    for timeout in [Some(Duration::from_millis(500)), None] {
        let start = Instant::now();
        let result = objective.evaluate(&render(&exp, &dir, &[]), timeout).unwrap();
        assert!(start.elapsed() < Duration::from_secs(3), "{timeout:?}");
        assert!(result.is_success());
        assert_eq!(result.stdout, "started\n");
    }
}

#[test]
fn setup_failure_skips_the_command() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");
    let exp = Experiment::new("tool", format!("touch {}", marker.display()))
        .setup("echo preparing; exit 3");
    let result = ShellObjective::new(Scoring::Timing)
        .evaluate(&render(&exp, &dir, &[]), None)
        .unwrap();

    assert_eq!(result.returncode, 3);
    assert!(result.stdout.starts_with("setup script failed"));
    assert!(result.stdout.contains("preparing"));
    assert_eq!(result.obj_output, FAILED_TRIAL_OUTCOME);
    assert!(!marker.exists());
}

#[test]
fn command_failure_reports_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let exp = Experiment::new("tool", "echo partial; echo broken >&2; exit 4");
    let result = ShellObjective::new(Scoring::Timing)
        .evaluate(&render(&exp, &dir, &[]), None)
        .unwrap();

    assert_eq!(result.returncode, 4);
    assert!(result.stdout.starts_with("command script failed"));
    assert!(result.stdout.contains("broken"));
    assert_eq!(result.obj_parameters["failed_stage"], "command");
}

#[test]
fn finish_failure_keeps_the_score() {
    let dir = tempfile::tempdir().unwrap();
    let exp = Experiment::new("matrix", "echo warming; echo ${k}")
        .parameter(Parameter::int("k", 0, 9))
        .finish("exit 1");
    let result = ShellObjective::new(Scoring::SearchMatrix)
        .evaluate(&render(&exp, &dir, &[3.2]), None)
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.obj_output, 3.0);
    assert_eq!(result.obj_parameters["finish_returncode"], 1);
}

#[test]
fn accuracy_tokens_are_scored() {
    let dir = tempfile::tempdir().unwrap();
    let exp = Experiment::new("classifier", "echo 'precision: 0.5'; echo 'recall=1.0'");
    let objective = ShellObjective::new(Scoring::Accuracy {
        score: AccuracyScore::F1,
    });
    let result = objective.evaluate(&render(&exp, &dir, &[]), None).unwrap();
    assert!((result.obj_output - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(result.obj_parameters["recall"], 1.0);
}

#[test]
fn unreadable_score_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let exp = Experiment::new("matrix", "echo done");
    let err = ShellObjective::new(Scoring::SearchMatrix)
        .evaluate(&render(&exp, &dir, &[]), None)
        .unwrap_err();
    assert!(err.is_trial_failure());
}

#[test]
fn every_script_is_kept_for_audit() {
    let dir = tempfile::tempdir().unwrap();
    let exp = Experiment::new("audit", "echo ${n}")
        .parameter(Parameter::int("n", 1, 5))
        .setup("true")
        .finish("true");
    let run = render(&exp, &dir, &[2.0]);
    ShellObjective::new(Scoring::Timing).evaluate(&run, None).unwrap();

    let mut names: Vec<String> = std::fs::read_dir(&run.scripts_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 3);
    assert!(names[0].starts_with("command_audit_"));
    assert!(names[1].starts_with("finish_audit_"));
    assert!(names[2].starts_with("setup_audit_"));

    let command = names.iter().find(|n| n.starts_with("command")).unwrap();
    let body = std::fs::read_to_string(run.scripts_dir.join(command)).unwrap();
    assert_eq!(body, "echo 2");
}

#[test]
fn script_runner_reports_exit_codes() {
    let dir = tempfile::tempdir().unwrap();
    let exp = Experiment::new("raw", "exit 7");
    let run = render(&exp, &dir, &[]);
    let out = ScriptRunner::new()
        .run(Stage::Command, &run.command, &run, None)
        .unwrap();
    assert_eq!(out.returncode, 7);
    assert!(!out.timed_out);
    assert!(out.script_path.exists());
}
