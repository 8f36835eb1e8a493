#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Parameter search over shell-script templates.
//!
//! `paropt` tunes the parameters of a command-line tool. An [`Experiment`]
//! names the tool, its setup/command/finish script templates and the integer
//! or real parameters to search. An [`Optimizer`] proposes configurations,
//! a [`Runner`] renders them into scripts, runs them through an
//! [`Objective`], stores every [`Trial`] and feeds the outcome back before
//! asking for the next configuration.
//!
//! # Getting Started
//!
//! ```no_run
//! use paropt::prelude::*;
//!
//! let experiment = Experiment::new("sleeper", "sleep ${secs}")
//!     .parameter(Parameter::int("secs", 0, 3));
//!
//! let mut runner = Runner::builder(
//!     experiment,
//!     BayesianOptimizer::new(2, 4),
//!     MemoryStorage::new(),
//!     ShellObjective::new(Scoring::Timing),
//! )
//! .logs_root("/tmp/paropt")
//! .build()
//! .unwrap();
//!
//! let result = runner.run();
//! let (best, outcome) = runner.get_max().unwrap();
//! println!("success={} best={best:?} outcome={outcome}", result.success);
//! runner.cleanup();
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`Experiment`] | Tool, script templates, parameters and compute target; deduplicated by content hash. |
//! | [`Parameter`](parameter::Parameter) | A named `int` or `float` range. |
//! | [`Trial`] | One executed configuration and its outcome (higher is better). |
//! | [`Optimizer`] | Closed set of search strategies behind one suggest/register protocol. |
//! | [`Objective`] | Runs a rendered configuration and scores it. |
//! | [`Storage`](storage::Storage) | Persists experiments and trials. |
//! | [`Runner`] | The optimization loop with its failure policy. |
//!
//! # Optimizers
//!
//! | Optimizer | Strategy | Stops after |
//! |-----------|----------|-------------|
//! | [`BayesianOptimizer`](optimizer::BayesianOptimizer) | Random start, then a Gaussian process with UCB, EI or POI | `n_init + n_iter` |
//! | [`GridSearch`](optimizer::GridSearch) | Cartesian product of evenly spaced points | the product of per-parameter counts |
//! | [`RandomSearch`](optimizer::RandomSearch) | Uniform draws | `n_iter` |
//! | [`CoordinateSearch`](optimizer::CoordinateSearch) | Compass moves around the incumbent | `n_init + n_iter` |
//!
//! All but grid search skip configurations that were already tried and can
//! stop early on a time budget or on lack of improvement
//! ([`StopPolicy`](optimizer::StopPolicy)). Every optimizer replays the
//! experiment's stored trials before its first suggestion.
//!
//! # Feature Flags
//!
//! | Flag | What it enables |
//! |------|-----------------|
//! | `sqlite` | [`SqliteStorage`](storage::SqliteStorage), relational persistence via `rusqlite` |

mod error;
mod param;
mod rng_util;

pub mod config;
pub mod experiment;
pub mod objective;
pub mod optimizer;
pub mod parameter;
pub mod runner;
pub mod storage;
pub mod template;
pub mod trial;

pub use error::{Error, Result};
pub use experiment::{Compute, Experiment};
pub use objective::{Objective, ObjectiveResult};
pub use optimizer::Optimizer;
pub use param::ParamValue;
pub use runner::{RunResult, RunState, Runner};
pub use trial::Trial;

/// Convenient wildcard import for the most common types.
///
/// ```
/// use paropt::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ObjectiveConfig, OptimizerConfig, RunSpec};
    pub use crate::error::{Error, Result};
    pub use crate::experiment::{Compute, Experiment};
    pub use crate::objective::{AccuracyScore, Objective, ObjectiveResult, Scoring, ShellObjective};
    pub use crate::optimizer::{
        BayesianOptimizer, CoordinateSearch, GridSearch, Optimizer, RandomSearch, StopPolicy,
        StopReason, Utility,
    };
    pub use crate::param::ParamValue;
    pub use crate::parameter::{ParamType, Parameter, ParameterConfig};
    #[cfg(feature = "sqlite")]
    pub use crate::storage::SqliteStorage;
    pub use crate::storage::{MemoryStorage, Storage};
    pub use crate::runner::{RunResult, RunState, Runner};
    pub use crate::template::RunConfig;
    pub use crate::trial::Trial;
}
