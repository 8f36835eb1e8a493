use core::time::Duration;

use serde_json::json;

use super::{Objective, ObjectiveResult, Scoring, ScriptOutput, ScriptRunner, Stage};
use crate::error::Result;
use crate::template::RunConfig;
use crate::trial::FAILED_TRIAL_OUTCOME;

/// Runs a trial's scripts in order and scores the command step.
///
/// Setup and command failures stop the sequence and are reported with the
/// stage in `stdout`. A failing finish script is logged and recorded in
/// `obj_parameters` but keeps the command's score.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use paropt::experiment::Experiment;
/// use paropt::objective::{Objective, Scoring, ShellObjective};
/// use paropt::template::RunConfig;
///
/// let experiment = Experiment::new("sleep", "sleep 1");
/// let run = RunConfig::render(&experiment, &[], "/tmp/paropt-scripts");
/// let result = ShellObjective::new(Scoring::Timing)
///     .evaluate(&run, Some(Duration::from_secs(5)))
///     .unwrap();
/// assert!(result.obj_output < 0.0);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ShellObjective {
    runner: ScriptRunner,
    scoring: Scoring,
}

impl ShellObjective {
    /// Creates an objective that runs scripts with `bash`.
    #[must_use]
    pub fn new(scoring: Scoring) -> Self {
        Self {
            runner: ScriptRunner::new(),
            scoring,
        }
    }

    /// Replaces the script runner.
    #[must_use]
    pub fn with_runner(mut self, runner: ScriptRunner) -> Self {
        self.runner = runner;
        self
    }

    /// The scoring function.
    #[must_use]
    pub fn scoring(&self) -> &Scoring {
        &self.scoring
    }
}

fn stage_failure(stage: Stage, output: &ScriptOutput) -> ObjectiveResult {
    ObjectiveResult {
        returncode: output.returncode,
        stdout: format!("{stage} script failed:\n{}", output.combined_output()),
        obj_output: FAILED_TRIAL_OUTCOME,
        obj_parameters: [("failed_stage".to_string(), json!(stage.as_str()))]
            .into_iter()
            .collect(),
    }
}

impl Objective for ShellObjective {
    fn evaluate(&self, run: &RunConfig, timeout: Option<Duration>) -> Result<ObjectiveResult> {
        if let Some(setup) = &run.setup {
            let out = self.runner.run(Stage::Setup, setup, run, None)?;
            if out.returncode != 0 {
                tracing::warn!(returncode = out.returncode, config = %run.describe(), "setup failed");
                return Ok(stage_failure(Stage::Setup, &out));
            }
        }

        let out = self.runner.run(Stage::Command, &run.command, run, timeout)?;
        if out.timed_out {
            let limit = timeout.unwrap_or(out.elapsed);
            return Ok(ObjectiveResult::timeout(self.scoring.timeout_score(limit))
                .with_parameter("timeout_secs", json!(limit.as_secs_f64())));
        }
        if out.returncode != 0 {
            return Ok(stage_failure(Stage::Command, &out));
        }

        let (obj_output, obj_parameters) = self.scoring.score(&out.stdout, out.elapsed)?;
        let mut result = ObjectiveResult {
            returncode: 0,
            stdout: out.stdout,
            obj_output,
            obj_parameters,
        };

        if let Some(finish) = &run.finish {
            match self.runner.run(Stage::Finish, finish, run, None) {
                Ok(fin) if fin.returncode == 0 => {}
                Ok(fin) => {
                    tracing::warn!(returncode = fin.returncode, "finish script failed");
                    result
                        .obj_parameters
                        .insert("finish_returncode".to_string(), json!(fin.returncode));
                    result
                        .obj_parameters
                        .insert("finish_output".to_string(), json!(fin.combined_output()));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "finish script could not run");
                    result
                        .obj_parameters
                        .insert("finish_error".to_string(), json!(err.to_string()));
                }
            }
        }

        Ok(result)
    }
}
