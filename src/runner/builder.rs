use core::time::Duration;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::experiment::Experiment;
use crate::objective::Objective;
use crate::optimizer::Optimizer;
use crate::storage::Storage;

use super::logging::RunLog;
use super::{RunState, Runner};

/// Default root for run directories.
pub const DEFAULT_LOGS_ROOT: &str = "paropt_logs";

/// Default multiplier applied to the timeout of the warm-up invocation.
pub const DEFAULT_WARMUP_FACTOR: f64 = 3.0;

/// Builder for [`Runner`], created with [`Runner::builder`].
///
/// # Defaults
///
/// - Logs root: `paropt_logs` in the working directory
/// - Timeout: none
/// - Warm-up: on, with three times the trial timeout
/// - Failed trials: not saved
/// - Console log: off
pub struct RunnerBuilder {
    experiment: Experiment,
    optimizer: Optimizer,
    storage: Box<dyn Storage>,
    objective: Box<dyn Objective>,
    logs_root: PathBuf,
    timeout: Option<Duration>,
    warmup: bool,
    warmup_factor: f64,
    save_fail_trial: bool,
    console_log: bool,
}

impl RunnerBuilder {
    pub(super) fn new(
        experiment: Experiment,
        optimizer: Optimizer,
        storage: Box<dyn Storage>,
        objective: Box<dyn Objective>,
    ) -> Self {
        Self {
            experiment,
            optimizer,
            storage,
            objective,
            logs_root: PathBuf::from(DEFAULT_LOGS_ROOT),
            timeout: None,
            warmup: true,
            warmup_factor: DEFAULT_WARMUP_FACTOR,
            save_fail_trial: false,
            console_log: false,
        }
    }

    /// Directory under which run directories are created.
    #[must_use]
    pub fn logs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.logs_root = root.into();
        self
    }

    /// Wall-clock limit for each trial's command step.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enables or disables the warm-up invocation before the first trial.
    #[must_use]
    pub fn warmup(mut self, enabled: bool) -> Self {
        self.warmup = enabled;
        self
    }

    /// Multiplier for the warm-up timeout.
    #[must_use]
    pub fn warmup_factor(mut self, factor: f64) -> Self {
        self.warmup_factor = factor;
        self
    }

    /// Persists a sentinel trial for each failed, non-timeout execution.
    #[must_use]
    pub fn save_fail_trial(mut self, save: bool) -> Self {
        self.save_fail_trial = save;
        self
    }

    /// Mirrors the run log to stderr.
    #[must_use]
    pub fn console_log(mut self, enabled: bool) -> Self {
        self.console_log = enabled;
        self
    }

    /// Resolves the experiment, binds the optimizer and creates the run
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a non-positive warm-up factor,
    /// [`Error::Storage`] if the experiment cannot be resolved, its history
    /// loaded or a run number reserved, a parameter error for an invalid
    /// definition, [`Error::DirectoryConflict`] if the run directory already exists, and
    /// [`Error::Io`] if it cannot be created.
    pub fn build(mut self) -> Result<Runner> {
        if !(self.warmup_factor.is_finite() && self.warmup_factor > 0.0) {
            return Err(Error::Config(format!(
                "warmup_factor must be positive, got {}",
                self.warmup_factor
            )));
        }
        let resolved = self.storage.get_or_create_experiment(&self.experiment)?;
        let experiment = resolved.experiment.clone();
        let experiment_id = experiment.require_id()?;

        let history = self.storage.trials(experiment_id)?;
        self.optimizer.set_experiment(&experiment, history)?;
        let run_number = self.storage.start_run(experiment_id)?;

        let run_dir = self
            .logs_root
            .join(format!("{}_{experiment_id}", experiment.tool_name))
            .join(format!("run_{run_number:03}"));
        if run_dir.exists() {
            return Err(Error::DirectoryConflict(run_dir));
        }
        let scripts_dir = run_dir.join("scripts");
        std::fs::create_dir_all(&scripts_dir)?;
        let log = RunLog::open(&run_dir, self.console_log)?;

        tracing::dispatcher::with_default(log.dispatch(), || {
            tracing::info!(
                experiment_id,
                run_number,
                created = resolved.created,
                optimizer = self.optimizer.name(),
                run_dir = %run_dir.display(),
                "runner initialized"
            );
        });

        Ok(Runner {
            experiment,
            experiment_id,
            run_number,
            optimizer: self.optimizer,
            storage: self.storage,
            objective: self.objective,
            timeout: self.timeout,
            warmup: self.warmup,
            warmup_factor: self.warmup_factor,
            save_fail_trial: self.save_fail_trial,
            run_dir,
            scripts_dir,
            log,
            state: RunState::Init,
        })
    }
}
