//! Experiment and trial persistence.
//!
//! The [`Storage`] trait is the only thing the runner knows about
//! persistence. A storage handle is shared for a whole run and must
//! serialize its own writes.
//!
//! # Available backends
//!
//! | Backend | Description | Feature flag |
//! |---------|-------------|-------------|
//! | [`MemoryStorage`] | Experiments and trials in a `Vec` behind a read-write lock | none |
//! | `SqliteStorage` | Relational tables in a `SQLite` file, one transaction per write | `sqlite` |
//!
//! # Deduplication
//!
//! [`get_or_create_experiment`](Storage::get_or_create_experiment) keys
//! experiments by [`Experiment::content_hash`], so structurally identical
//! definitions resolve to the same stored experiment no matter how often or
//! in which order they are submitted.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

use crate::error::{Error, Result};
use crate::experiment::Experiment;
use crate::trial::Trial;

/// Result of [`Storage::get_or_create_experiment`].
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedExperiment {
    /// The stored experiment, with `id` set.
    pub experiment: Experiment,
    /// Highest run number among its started runs and trials, `None` if it
    /// has neither.
    pub last_run_number: Option<u64>,
    /// Whether this call created the experiment.
    pub created: bool,
}

/// One past `last`, or zero.
pub(crate) fn next_run_number(last: Option<u64>) -> u64 {
    last.map_or(0, |n| n + 1)
}

/// Persistence capability consumed by the runner.
pub trait Storage: Send + Sync {
    /// Returns the stored experiment with the same content hash as
    /// `experiment`, creating it if there is none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failure, or a parameter
    /// validation error for a new, invalid definition.
    fn get_or_create_experiment(&self, experiment: &Experiment) -> Result<ResolvedExperiment>;

    /// Persists a trial and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the experiment is unknown or the write
    /// fails, and [`Error::UnknownParameter`] if a configuration references
    /// a parameter the experiment does not declare.
    fn save_result(&self, trial: Trial) -> Result<Trial>;

    /// Reserves the next run number of an experiment and returns it.
    ///
    /// The number is one past the highest started run or stored trial, so a
    /// session that saved no trials still consumes its number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the experiment is unknown or the write
    /// fails.
    fn start_run(&self, experiment_id: u64) -> Result<u64>;

    /// All trials of an experiment in the order they were saved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failure.
    fn trials(&self, experiment_id: u64) -> Result<Vec<Trial>>;

    /// Looks an experiment up by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failure.
    fn experiment(&self, id: u64) -> Result<Option<Experiment>>;
}

/// Checks that every configuration of `trial` refers to one of
/// `experiment`'s parameters.
pub(crate) fn validate_trial(experiment: &Experiment, trial: &Trial) -> Result<()> {
    for config in &trial.parameter_configs {
        if !experiment.parameters.contains(&config.parameter) {
            return Err(Error::UnknownParameter(config.name().to_string()));
        }
    }
    Ok(())
}
