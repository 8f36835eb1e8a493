//! Turning a rendered [`RunConfig`] into a score.
//!
//! An [`Objective`] runs one trial and reports an [`ObjectiveResult`]. The
//! shipped implementation, [`ShellObjective`], executes the setup, command
//! and finish scripts with `bash` through a [`ScriptRunner`] and scores the
//! command step with a [`Scoring`] function. Any closure with the right
//! signature is an objective too, which is how tests stub execution out.
//!
//! Outcomes are oriented so that higher is better: runtimes are negated and
//! scaled to days before they are returned.

mod scoring;
mod script;
mod shell;

use core::time::Duration;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use self::scoring::{AccuracyReport, AccuracyScore, Scoring, f1_score, parse_accuracy};
pub use self::script::{ScriptOutput, ScriptRunner, Stage};
pub use self::shell::ShellObjective;

use crate::error::Result;
use crate::template::RunConfig;

/// Seconds in a day; runtimes are divided by this before negation.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// `stdout` of a result whose command step hit the timeout.
pub const TIMEOUT_SENTINEL: &str = "Timeout";

/// Exit code reported for a timed-out command.
pub const TIMEOUT_RETURNCODE: i32 = -1;

/// What one objective evaluation produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveResult {
    /// Exit code of the last executed stage.
    pub returncode: i32,
    /// Captured output, or [`TIMEOUT_SENTINEL`].
    pub stdout: String,
    /// Score; higher is better.
    pub obj_output: f64,
    /// Extra values worth persisting with the trial.
    #[serde(default)]
    pub obj_parameters: BTreeMap<String, serde_json::Value>,
}

impl ObjectiveResult {
    /// A successful result.
    #[must_use]
    pub fn success(stdout: impl Into<String>, obj_output: f64) -> Self {
        Self {
            returncode: 0,
            stdout: stdout.into(),
            obj_output,
            obj_parameters: BTreeMap::new(),
        }
    }

    /// A timed-out result scored as `obj_output`.
    #[must_use]
    pub fn timeout(obj_output: f64) -> Self {
        Self {
            returncode: TIMEOUT_RETURNCODE,
            stdout: TIMEOUT_SENTINEL.to_string(),
            obj_output,
            obj_parameters: BTreeMap::new(),
        }
    }

    /// Attaches an extra value.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.obj_parameters.insert(key.into(), value);
        self
    }

    /// Returns `true` if the command step timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.stdout == TIMEOUT_SENTINEL
    }

    /// Returns `true` if every stage exited cleanly.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.returncode == 0 && !self.is_timeout()
    }
}

/// Runs one trial.
///
/// Implementations block until the trial's result is known. A non-zero exit
/// or a timeout is reported inside [`ObjectiveResult`]; `Err` is reserved for
/// failures to run or score the trial at all.
pub trait Objective {
    /// Executes `run` and scores it. `timeout` bounds the command step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if a script cannot be written
    /// or spawned, or [`Error::ObjectiveOutput`](crate::Error::ObjectiveOutput)
    /// if no score can be read from its output.
    fn evaluate(&self, run: &RunConfig, timeout: Option<Duration>) -> Result<ObjectiveResult>;

    /// Releases execution resources. Called once after a run.
    fn cleanup(&self) {}
}

impl<F> Objective for F
where
    F: Fn(&RunConfig, Option<Duration>) -> Result<ObjectiveResult>,
{
    fn evaluate(&self, run: &RunConfig, timeout: Option<Duration>) -> Result<ObjectiveResult> {
        self(run, timeout)
    }
}

/// Negated, day-scaled runtime.
#[must_use]
pub fn time_outcome(elapsed: Duration) -> f64 {
    -elapsed.as_secs_f64() / SECONDS_PER_DAY
}
