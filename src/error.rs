//! The crate-wide error type.
//!
//! Per-trial failures and fatal failures share one enum;
//! [`Error::is_trial_failure`] tells them apart.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a parameter's bounds are not finite, not ordered, or
    /// not whole numbers for an integer parameter.
    #[error("invalid bounds [{minimum}, {maximum}] for parameter '{name}'")]
    InvalidBounds {
        /// The parameter name.
        name: String,
        /// The declared minimum.
        minimum: f64,
        /// The declared maximum.
        maximum: f64,
    },

    /// Returned when two parameters of one experiment share a name.
    #[error("parameter '{0}' is declared more than once")]
    DuplicateParameter(String),

    /// Returned when a configuration references a parameter the experiment
    /// does not declare.
    #[error("parameter '{0}' not found in experiment")]
    UnknownParameter(String),

    /// Returned when a configuration does not assign every declared parameter.
    #[error("configuration is missing a value for parameter '{0}'")]
    IncompleteConfig(String),

    /// Returned when a grid cannot be built for the bound parameters.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    /// Returned when duplicate avoidance could not find an untested configuration.
    #[error(
        "failed to find an untested configuration after {attempts} attempts; \
         consider widening exploration (e.g. a larger kappa)"
    )]
    SuggestionExhausted {
        /// Number of resamples attempted.
        attempts: usize,
    },

    /// Returned when an optimizer is iterated before `set_experiment`.
    #[error("optimizer has no experiment bound; call set_experiment first")]
    NotBound,

    /// Returned when a trial's script exits with a non-zero code.
    #[error("non-zero exit ({returncode}) for config {config}:\n{output}")]
    TrialExecution {
        /// Process exit code.
        returncode: i32,
        /// Rendered parameter assignment.
        config: String,
        /// Captured output, prefixed with the failing stage.
        output: String,
    },

    /// Reported when a trial's command exceeds its wall-clock timeout. The
    /// trial is still persisted with its timeout score.
    #[error("trial timed out after {timeout_secs}s for config {config}")]
    TrialTimeout {
        /// The timeout that elapsed.
        timeout_secs: f64,
        /// Rendered parameter assignment.
        config: String,
    },

    /// Returned when an objective cannot extract a score from a script's output.
    #[error("objective output error: {0}")]
    ObjectiveOutput(String),

    /// Returned when a storage operation fails.
    #[error("storage error: {0}")]
    Storage(String),

    /// Returned when a configuration file cannot be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// Returned when a run directory already exists.
    #[error("run directory already exists: {0}")]
    DirectoryConflict(std::path::PathBuf),

    /// Wraps an I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for failures scoped to a single trial.
    ///
    /// The runner records these and keeps iterating; every other variant
    /// ends the run.
    #[must_use]
    pub fn is_trial_failure(&self) -> bool {
        matches!(
            self,
            Error::TrialExecution { .. }
                | Error::TrialTimeout { .. }
                | Error::ObjectiveOutput(_)
                | Error::Io(_)
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}
