//! Scoring functions applied to a finished command.

use core::time::Duration;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{SECONDS_PER_DAY, time_outcome};
use crate::error::{Error, Result};
use crate::trial::FAILED_TRIAL_OUTCOME;

/// How a command's output and runtime become an outcome.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use paropt::objective::Scoring;
///
/// let (outcome, _) = Scoring::Timing.score("", Duration::from_secs(8640)).unwrap();
/// assert!((outcome + 0.1).abs() < 1e-12);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Scoring {
    /// Negated, day-scaled wall-clock time of the command.
    #[default]
    Timing,
    /// A number printed as the last non-empty line of stdout; higher is better.
    SearchMatrix,
    /// Precision, recall and time tokens read from stdout.
    Accuracy {
        /// How the tokens are combined.
        #[serde(default)]
        score: AccuracyScore,
    },
}

/// Combination of precision, recall and runtime into one outcome.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccuracyScore {
    /// Harmonic mean of precision and recall.
    #[default]
    F1,
    /// `(1 - w) * f1 + w * 2 / (1 + exp(t / s))`: a time bonus that decays
    /// from 1 at `t = 0` towards 0 as `t` grows past `s`.
    SigmoidTradeoff {
        /// Weight `w` of the time term, in `[0, 1]`.
        time_weight: f64,
        /// Time scale `s` in seconds.
        time_scale: f64,
    },
    /// Negated day-scaled time, minus `penalty * (min_accuracy - f1)` when F1
    /// falls below `min_accuracy`.
    BoundaryPenalty {
        /// Minimum acceptable F1.
        min_accuracy: f64,
        /// Weight of the shortfall.
        penalty: f64,
    },
}

/// Tokens parsed from an accuracy-reporting command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AccuracyReport {
    /// Reported precision.
    pub precision: f64,
    /// Reported recall.
    pub recall: f64,
    /// Reported time in seconds, if any.
    pub time: Option<f64>,
}

/// Harmonic mean of precision and recall; zero when both are zero.
#[must_use]
pub fn f1_score(precision: f64, recall: f64) -> f64 {
    let sum = precision + recall;
    if sum <= 0.0 {
        0.0
    } else {
        2.0 * precision * recall / sum
    }
}

/// Reads `precision`, `recall` and `time` tokens from `stdout`.
///
/// Tokens look like `key: value` or `key=value`, keys match
/// case-insensitively and the last occurrence of a key wins.
///
/// # Errors
///
/// Returns [`Error::ObjectiveOutput`] if precision or recall is missing.
pub fn parse_accuracy(stdout: &str) -> Result<AccuracyReport> {
    let mut precision = None;
    let mut recall = None;
    let mut time = None;

    for line in stdout.lines() {
        for token in line.split([',', ';']) {
            let Some((key, value)) = token.split_once([':', '=']) else {
                continue;
            };
            let Ok(value) = value.trim().parse::<f64>() else {
                continue;
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "precision" => precision = Some(value),
                "recall" => recall = Some(value),
                "time" => time = Some(value),
                _ => {}
            }
        }
    }

    match (precision, recall) {
        (Some(precision), Some(recall)) => Ok(AccuracyReport {
            precision,
            recall,
            time,
        }),
        _ => Err(Error::ObjectiveOutput(
            "expected 'precision' and 'recall' values in command output".to_string(),
        )),
    }
}

impl AccuracyScore {
    /// Scores a report. `elapsed` is used when the report carries no time.
    #[must_use]
    pub fn combine(&self, report: &AccuracyReport, elapsed: Duration) -> f64 {
        let f1 = f1_score(report.precision, report.recall);
        let t = report.time.unwrap_or_else(|| elapsed.as_secs_f64());
        match *self {
            AccuracyScore::F1 => f1,
            AccuracyScore::SigmoidTradeoff {
                time_weight,
                time_scale,
            } => {
                let scale = time_scale.max(f64::EPSILON);
                (1.0 - time_weight) * f1 + time_weight * 2.0 / (1.0 + (t / scale).exp())
            }
            AccuracyScore::BoundaryPenalty {
                min_accuracy,
                penalty,
            } => {
                let shortfall = (min_accuracy - f1).max(0.0);
                -t / SECONDS_PER_DAY - penalty * shortfall
            }
        }
    }
}

impl Scoring {
    /// Scores a finished command, returning the outcome and extra values to
    /// store with the trial.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObjectiveOutput`] if the output cannot be scored.
    pub fn score(
        &self,
        stdout: &str,
        elapsed: Duration,
    ) -> Result<(f64, BTreeMap<String, serde_json::Value>)> {
        let mut extra = BTreeMap::new();
        extra.insert("elapsed_secs".to_string(), json!(elapsed.as_secs_f64()));

        let outcome = match self {
            Scoring::Timing => time_outcome(elapsed),
            Scoring::SearchMatrix => {
                let line = stdout
                    .lines()
                    .map(str::trim)
                    .rfind(|l| !l.is_empty())
                    .ok_or_else(|| Error::ObjectiveOutput("command printed no score".into()))?;
                line.parse::<f64>().map_err(|_| {
                    Error::ObjectiveOutput(format!("last output line is not a number: '{line}'"))
                })?
            }
            Scoring::Accuracy { score } => {
                let report = parse_accuracy(stdout)?;
                extra.insert("precision".to_string(), json!(report.precision));
                extra.insert("recall".to_string(), json!(report.recall));
                extra.insert(
                    "f1".to_string(),
                    json!(f1_score(report.precision, report.recall)),
                );
                if let Some(t) = report.time {
                    extra.insert("time".to_string(), json!(t));
                }
                score.combine(&report, elapsed)
            }
        };

        if !outcome.is_finite() {
            return Err(Error::ObjectiveOutput(format!("non-finite outcome {outcome}")));
        }
        Ok((outcome, extra))
    }

    /// Outcome assigned to a command killed after `timeout`.
    ///
    /// Time-based scores treat the trial as if it ran for exactly `timeout`
    /// with zero accuracy; a search-matrix score has no time component and
    /// gets the failure sentinel.
    #[must_use]
    pub fn timeout_score(&self, timeout: Duration) -> f64 {
        match self {
            Scoring::Timing => time_outcome(timeout),
            Scoring::SearchMatrix => FAILED_TRIAL_OUTCOME,
            Scoring::Accuracy { score } => score.combine(
                &AccuracyReport {
                    precision: 0.0,
                    recall: 0.0,
                    time: Some(timeout.as_secs_f64()),
                },
                timeout,
            ),
        }
    }
}
