//! Declarative run definitions loaded from JSON or YAML.
//!
//! ```yaml
//! experiment:
//!   tool_name: sleeper
//!   command_template: sleep ${secs}
//!   parameters:
//!     - {name: secs, type: int, minimum: 0, maximum: 3}
//! optimizer:
//!   type: grid
//!   num_configs_per_param: [4]
//! objective:
//!   type: timing
//!   timeout: 10
//! runner:
//!   logs_root: /tmp/paropt
//!   save_fail_trial: true
//! ```
//!
//! A missing `optimizer` section means Bayesian optimization with two
//! initial and two guided suggestions; a missing `objective` means timing.

use core::time::Duration;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::experiment::Experiment;
use crate::objective::{Scoring, ShellObjective};
use crate::optimizer::{
    BayesianOptimizer, CoordinateSearch, GridSearch, Optimizer, RandomSearch, StopPolicy, Utility,
};
use crate::runner::{DEFAULT_LOGS_ROOT, DEFAULT_WARMUP_FACTOR, Runner, RunnerBuilder};
use crate::storage::Storage;

fn default_two() -> usize {
    2
}

fn default_one() -> usize {
    1
}

fn default_ten() -> usize {
    10
}

/// Optimizer selection, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OptimizerConfig {
    /// Gaussian-process Bayesian optimization.
    #[serde(rename = "bayesopt")]
    Bayesian {
        #[serde(default = "default_two")]
        n_init: usize,
        #[serde(default = "default_two")]
        n_iter: usize,
        #[serde(default)]
        alpha: Option<f64>,
        #[serde(default)]
        kappa: Option<f64>,
        #[serde(default)]
        utility: Option<Utility>,
        #[serde(default)]
        budget: Option<f64>,
        #[serde(default)]
        converge_thres: Option<f64>,
        #[serde(default)]
        converge_steps: Option<usize>,
        #[serde(default)]
        random_seed: Option<u64>,
    },
    /// Exhaustive grid.
    Grid { num_configs_per_param: Vec<usize> },
    /// Uniform random draws.
    Random {
        #[serde(default = "default_ten")]
        n_iter: usize,
        #[serde(default)]
        budget: Option<f64>,
        #[serde(default)]
        converge_thres: Option<f64>,
        #[serde(default)]
        converge_steps: Option<usize>,
        #[serde(default)]
        random_seed: Option<u64>,
    },
    /// Compass search around the incumbent.
    Coordinate {
        #[serde(default = "default_one")]
        n_init: usize,
        #[serde(default = "default_ten")]
        n_iter: usize,
        #[serde(default)]
        budget: Option<f64>,
        #[serde(default)]
        converge_thres: Option<f64>,
        #[serde(default)]
        converge_steps: Option<usize>,
        #[serde(default)]
        random_seed: Option<u64>,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Bayesian {
            n_init: 2,
            n_iter: 2,
            alpha: None,
            kappa: None,
            utility: None,
            budget: None,
            converge_thres: None,
            converge_steps: None,
            random_seed: None,
        }
    }
}

impl OptimizerConfig {
    /// Constructs the optimizer this section describes.
    #[must_use]
    pub fn build(&self) -> Optimizer {
        match self {
            OptimizerConfig::Bayesian {
                n_init,
                n_iter,
                alpha,
                kappa,
                utility,
                budget,
                converge_thres,
                converge_steps,
                random_seed,
            } => {
                let mut builder = BayesianOptimizer::builder()
                    .n_init(*n_init)
                    .n_iter(*n_iter)
                    .policy(StopPolicy {
                        budget: *budget,
                        converge_thres: *converge_thres,
                        converge_steps: *converge_steps,
                    });
                if let Some(alpha) = alpha {
                    builder = builder.alpha(*alpha);
                }
                // An explicit utility wins over a bare kappa.
                if let Some(kappa) = kappa {
                    builder = builder.kappa(*kappa);
                }
                if let Some(utility) = utility {
                    builder = builder.utility(*utility);
                }
                if let Some(seed) = random_seed {
                    builder = builder.seed(*seed);
                }
                builder.build().into()
            }
            OptimizerConfig::Grid {
                num_configs_per_param,
            } => GridSearch::new(num_configs_per_param.clone()).into(),
            OptimizerConfig::Random {
                n_iter,
                budget,
                converge_thres,
                converge_steps,
                random_seed,
            } => {
                let mut builder = RandomSearch::builder().n_iter(*n_iter).policy(StopPolicy {
                    budget: *budget,
                    converge_thres: *converge_thres,
                    converge_steps: *converge_steps,
                });
                if let Some(seed) = random_seed {
                    builder = builder.seed(*seed);
                }
                builder.build().into()
            }
            OptimizerConfig::Coordinate {
                n_init,
                n_iter,
                budget,
                converge_thres,
                converge_steps,
                random_seed,
            } => {
                let mut builder = CoordinateSearch::builder()
                    .n_init(*n_init)
                    .n_iter(*n_iter)
                    .policy(StopPolicy {
                        budget: *budget,
                        converge_thres: *converge_thres,
                        converge_steps: *converge_steps,
                    });
                if let Some(seed) = random_seed {
                    builder = builder.seed(*seed);
                }
                builder.build().into()
            }
        }
    }
}

/// Scoring function and command timeout.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveConfig {
    /// Scoring function, tagged by `type`.
    #[serde(flatten)]
    pub scoring: Scoring,
    /// Command timeout in seconds.
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl ObjectiveConfig {
    /// The timeout as a duration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a negative or non-finite timeout.
    pub fn timeout(&self) -> Result<Option<Duration>> {
        self.timeout
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| Error::Config(format!("invalid timeout {secs}: {e}")))
            })
            .transpose()
    }

    /// A shell objective using this scoring function.
    #[must_use]
    pub fn build(&self) -> ShellObjective {
        ShellObjective::new(self.scoring.clone())
    }
}

/// Runner settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Root for run directories.
    pub logs_root: PathBuf,
    /// Persist sentinel trials for failed executions.
    pub save_fail_trial: bool,
    /// Run a warm-up invocation before the first trial.
    pub warmup: bool,
    /// Warm-up timeout multiplier.
    pub warmup_factor: f64,
    /// Mirror the run log to stderr.
    pub console_log: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            logs_root: PathBuf::from(DEFAULT_LOGS_ROOT),
            save_fail_trial: false,
            warmup: true,
            warmup_factor: DEFAULT_WARMUP_FACTOR,
            console_log: false,
        }
    }
}

/// A complete run definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    /// What to run and which parameters to search.
    pub experiment: Experiment,
    /// How to search.
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    /// How to score.
    #[serde(default)]
    pub objective: ObjectiveConfig,
    /// Runner settings.
    #[serde(default)]
    pub runner: RunnerConfig,
}

impl RunSpec {
    /// Loads a definition from a `.json`, `.yaml` or `.yml` file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::Config`] for an unsupported extension or invalid content.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let parse: fn(&str) -> Result<Self> = match ext.as_deref() {
            Some("json") => Self::from_json,
            Some("yaml" | "yml") => Self::from_yaml,
            _ => {
                return Err(Error::Config(format!(
                    "unsupported config file '{}': expected .json, .yaml or .yml",
                    path.display()
                )));
            }
        };
        let text = std::fs::read_to_string(path)?;
        parse(&text)
    }

    /// Parses a JSON definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on invalid content.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parses a YAML definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on invalid content.
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// A runner builder configured from this definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid timeout.
    pub fn runner(&self, storage: impl Storage + 'static) -> Result<RunnerBuilder> {
        let mut builder = Runner::builder(
            self.experiment.clone(),
            self.optimizer.build(),
            storage,
            self.objective.build(),
        )
        .logs_root(self.runner.logs_root.clone())
        .save_fail_trial(self.runner.save_fail_trial)
        .warmup(self.runner.warmup)
        .warmup_factor(self.runner.warmup_factor)
        .console_log(self.runner.console_log);
        if let Some(timeout) = self.objective.timeout()? {
            builder = builder.timeout(timeout);
        }
        Ok(builder)
    }
}
