//! The optimization loop.
//!
//! A [`Runner`] pulls configurations from an [`Optimizer`], renders them
//! into scripts, evaluates them with an [`Objective`], persists each result
//! through a [`Storage`] and feeds it back to the optimizer before asking
//! for the next configuration.
//!
//! # Failure policy
//!
//! | What happened | Persisted | Optimizer | Run result |
//! |---------------|-----------|-----------|------------|
//! | Command succeeded | trial with the score | `register` | entry only |
//! | Command timed out | trial with the timeout score | `register` | failed |
//! | Non-zero exit or unreadable output | sentinel trial if `save_fail_trial` | `register_failure` if saved | failed |
//! | Storage or optimizer error | nothing | untouched | failed, loop stops |
//!
//! A failed trial never aborts the search. Errors raised while building the
//! runner (bad definition, unreachable storage, directory conflict) are
//! returned from [`RunnerBuilder::build`].

mod builder;
mod logging;

use core::time::Duration;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;

pub use self::builder::{DEFAULT_LOGS_ROOT, DEFAULT_WARMUP_FACTOR, RunnerBuilder};
pub use self::logging::LOG_FILE;

use self::logging::RunLog;
use crate::error::{Error, Result};
use crate::experiment::Experiment;
use crate::objective::{Objective, ObjectiveResult};
use crate::optimizer::{Optimizer, StopReason};
use crate::parameter::ParameterConfig;
use crate::storage::Storage;
use crate::template::RunConfig;
use crate::trial::{FAILED_TRIAL_OUTCOME, Trial};

/// Lifecycle of a [`Runner`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Built, not yet run.
    Init,
    /// Executing the warm-up invocation for the first configuration.
    Warmup,
    /// Executing trials.
    Iterating,
    /// The loop has ended.
    Done,
}

/// Summary of one [`Runner::run`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunResult {
    /// `false` if any trial failed or the loop stopped on an error.
    pub success: bool,
    /// One entry per trial, keyed `experiment/run/config`, plus an `error`
    /// entry if the loop stopped early.
    pub message: BTreeMap<String, String>,
    /// Why the optimizer stopped, if it did.
    pub stop_reason: Option<StopReason>,
}

impl RunResult {
    fn new() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    fn insert(&mut self, key: String, description: String) {
        let mut unique = key.clone();
        let mut n = 2;
        while self.message.contains_key(&unique) {
            unique = format!("{key} #{n}");
            n += 1;
        }
        self.message.insert(unique, description);
    }
}

/// How one trial ended, from the loop's point of view.
enum TrialReport {
    Success(f64),
    Timeout { outcome: f64, error: Error },
    Failed(Error),
}

/// Drives one optimization session for an experiment.
///
/// # Examples
///
/// ```no_run
/// use paropt::experiment::Experiment;
/// use paropt::objective::{Scoring, ShellObjective};
/// use paropt::optimizer::GridSearch;
/// use paropt::parameter::Parameter;
/// use paropt::runner::Runner;
/// use paropt::storage::MemoryStorage;
///
/// let experiment = Experiment::new("sleep", "sleep ${secs}")
///     .parameter(Parameter::int("secs", 0, 2));
/// let mut runner = Runner::builder(
///     experiment,
///     GridSearch::new(vec![3]),
///     MemoryStorage::new(),
///     ShellObjective::new(Scoring::Timing),
/// )
/// .logs_root("/tmp/paropt")
/// .build()
/// .unwrap();
///
/// let result = runner.run();
/// println!("{result:?} best={:?}", runner.get_max());
/// runner.cleanup();
/// ```
pub struct Runner {
    experiment: Experiment,
    experiment_id: u64,
    run_number: u64,
    optimizer: Optimizer,
    storage: Box<dyn Storage>,
    objective: Box<dyn Objective>,
    timeout: Option<Duration>,
    warmup: bool,
    warmup_factor: f64,
    save_fail_trial: bool,
    run_dir: PathBuf,
    scripts_dir: PathBuf,
    log: RunLog,
    state: RunState,
}

impl Runner {
    /// Starts building a runner.
    #[must_use]
    pub fn builder(
        experiment: Experiment,
        optimizer: impl Into<Optimizer>,
        storage: impl Storage + 'static,
        objective: impl Objective + 'static,
    ) -> RunnerBuilder {
        RunnerBuilder::new(
            experiment,
            optimizer.into(),
            Box::new(storage),
            Box::new(objective),
        )
    }

    /// Runs until the optimizer is exhausted or a fatal error occurs.
    ///
    /// Calling it again resumes with the optimizer's remaining suggestions;
    /// once the optimizer has stopped it returns an empty, successful result.
    pub fn run(&mut self) -> RunResult {
        let dispatch = self.log.dispatch().clone();
        tracing::dispatcher::with_default(&dispatch, || self.run_loop())
    }

    fn run_loop(&mut self) -> RunResult {
        let mut result = RunResult::new();
        tracing::info!(
            tool = %self.experiment.tool_name,
            experiment_id = self.experiment_id,
            run_number = self.run_number,
            optimizer = self.optimizer.name(),
            "starting run"
        );

        if let Err(err) = self.optimizer.warm_start() {
            self.fail(&mut result, &err);
            return result;
        }
        tracing::info!(replayed = self.optimizer.registered(), "warm start complete");

        loop {
            let configs = match self.optimizer.next_config() {
                Ok(Some(configs)) => configs,
                Ok(None) => break,
                Err(err) => {
                    self.fail(&mut result, &err);
                    return result;
                }
            };
            let run = RunConfig::render(&self.experiment, &configs, &self.scripts_dir);

            if self.state == RunState::Init {
                if self.warmup {
                    self.state = RunState::Warmup;
                    self.warm_up(&run);
                }
                self.state = RunState::Iterating;
            }

            let key = format!("{}/{}/{}", self.experiment_id, self.run_number, run.describe());
            match self.run_trial(configs, &run) {
                Ok(TrialReport::Success(outcome)) => {
                    result.insert(key, format!("ok: outcome {outcome}"));
                }
                Ok(TrialReport::Timeout { outcome, error }) => {
                    result.success = false;
                    result.insert(key, format!("timeout: {error}; outcome {outcome}"));
                }
                Ok(TrialReport::Failed(err)) => {
                    result.success = false;
                    result.insert(key, format!("failed: {err}"));
                }
                Err(err) => {
                    result.success = false;
                    result.insert(key, format!("error: {err}"));
                    self.fail(&mut result, &err);
                    return result;
                }
            }
        }

        self.state = RunState::Done;
        result.stop_reason = self.optimizer.stop_reason();
        match self.optimizer.get_max() {
            Some((best, outcome)) => tracing::info!(
                stop = ?result.stop_reason,
                best = %crate::parameter::config_key(&best),
                outcome,
                "run finished"
            ),
            None => tracing::info!(stop = ?result.stop_reason, "run finished without results"),
        }
        result
    }

    fn fail(&mut self, result: &mut RunResult, err: &Error) {
        tracing::error!(error = %err, "run stopped");
        result.success = false;
        result.message.insert("error".to_string(), err.to_string());
        result.stop_reason = self.optimizer.stop_reason();
        self.state = RunState::Done;
    }

    /// Evaluates the first configuration once with an extended timeout and
    /// discards the result.
    fn warm_up(&self, run: &RunConfig) {
        let timeout = self.timeout.map(|t| t.mul_f64(self.warmup_factor));
        tracing::info!(config = %run.describe(), timeout_secs = ?timeout.map(|t| t.as_secs_f64()), "warm-up");
        match self.objective.evaluate(run, timeout) {
            Ok(res) => tracing::debug!(returncode = res.returncode, outcome = res.obj_output, "warm-up done"),
            Err(err) => tracing::warn!(error = %err, "warm-up failed"),
        }
    }

    /// Executes, persists and registers one trial.
    ///
    /// `Err` is returned only for failures that must stop the loop.
    fn run_trial(&mut self, configs: Vec<ParameterConfig>, run: &RunConfig) -> Result<TrialReport> {
        match self.objective.evaluate(run, self.timeout) {
            Ok(res) if res.is_timeout() => {
                let outcome = res.obj_output;
                let error = Error::TrialTimeout {
                    timeout_secs: res
                        .obj_parameters
                        .get("timeout_secs")
                        .and_then(serde_json::Value::as_f64)
                        .or_else(|| self.timeout.map(|t| t.as_secs_f64()))
                        .unwrap_or_default(),
                    config: run.describe(),
                };
                let trial = self.save(configs, res)?;
                tracing::warn!(error = %error, outcome, "trial timed out");
                if trial.is_failure() {
                    self.optimizer.register_failure(&trial)?;
                } else {
                    self.optimizer.register(&trial)?;
                }
                Ok(TrialReport::Timeout { outcome, error })
            }
            Ok(res) if res.returncode != 0 => {
                let err = Error::TrialExecution {
                    returncode: res.returncode,
                    config: run.describe(),
                    output: res.stdout,
                };
                self.record_failure(configs, err)
            }
            Ok(res) => {
                let outcome = res.obj_output;
                let best_before = self.optimizer.get_max().map(|(_, v)| v);
                let trial = self.save(configs, res)?;
                self.optimizer.register(&trial)?;
                tracing::info!(trial_id = ?trial.id, config = %run.describe(), outcome, "trial saved");
                if best_before.is_none_or(|b| outcome > b) {
                    tracing::info!(outcome, "new best");
                }
                Ok(TrialReport::Success(outcome))
            }
            Err(err) if err.is_trial_failure() => self.record_failure(configs, err),
            Err(err) => Err(err),
        }
    }

    fn save(&self, configs: Vec<ParameterConfig>, res: ObjectiveResult) -> Result<Trial> {
        let trial = Trial::new(self.experiment_id, self.run_number, configs, res.obj_output)
            .with_obj_parameters(res.obj_parameters);
        self.storage.save_result(trial)
    }

    fn record_failure(&mut self, configs: Vec<ParameterConfig>, err: Error) -> Result<TrialReport> {
        tracing::warn!(error = %err, "trial failed");
        if self.save_fail_trial {
            let trial = Trial::new(
                self.experiment_id,
                self.run_number,
                configs,
                FAILED_TRIAL_OUTCOME,
            )
            .with_obj_parameters(BTreeMap::from([(
                "error".to_string(),
                json!(err.to_string()),
            )]));
            let trial = self.storage.save_result(trial)?;
            self.optimizer.register_failure(&trial)?;
        }
        Ok(TrialReport::Failed(err))
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Best configuration and outcome seen so far, history included.
    #[must_use]
    pub fn get_max(&self) -> Option<(Vec<ParameterConfig>, f64)> {
        self.optimizer.get_max()
    }

    /// The persisted experiment.
    #[must_use]
    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    /// Session number of this run within its experiment.
    #[must_use]
    pub fn run_number(&self) -> u64 {
        self.run_number
    }

    /// The optimizer driving this run.
    #[must_use]
    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    /// Directory holding this run's log and scripts.
    #[must_use]
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Path of this run's log file.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    /// Releases the objective's execution resources and closes the log.
    ///
    /// Consumes the runner, so it happens exactly once.
    pub fn cleanup(self) {
        tracing::dispatcher::with_default(self.log.dispatch(), || {
            tracing::info!(run_number = self.run_number, "cleanup");
            self.objective.cleanup();
        });
    }
}

impl core::fmt::Debug for Runner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Runner")
            .field("experiment_id", &self.experiment_id)
            .field("run_number", &self.run_number)
            .field("optimizer", &self.optimizer)
            .field("state", &self.state)
            .field("run_dir", &self.run_dir)
            .finish_non_exhaustive()
    }
}
