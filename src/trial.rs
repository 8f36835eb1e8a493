//! The persisted record of one executed configuration.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::param::ParamValue;
use crate::parameter::{ParameterConfig, config_key, configs_to_values};

/// Outcome recorded for a trial that failed outside of a timeout.
///
/// Only persisted when the runner's `save_fail_trial` policy is on.
pub const FAILED_TRIAL_OUTCOME: f64 = -1.0e6;

/// One executed configuration and its outcome.
///
/// `outcome` is oriented so that higher is better. A trial is immutable once
/// saved; storage assigns `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// Storage-assigned id; `None` until saved.
    #[serde(default)]
    pub id: Option<u64>,
    /// Owning experiment.
    pub experiment_id: u64,
    /// Runner session that produced this trial.
    pub run_number: u64,
    /// Assigned values, one per experiment parameter.
    pub parameter_configs: Vec<ParameterConfig>,
    /// Score; higher is better.
    pub outcome: f64,
    /// Extra values reported by the objective.
    #[serde(default)]
    pub obj_parameters: BTreeMap<String, serde_json::Value>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl Trial {
    /// Creates an unsaved trial stamped with the current time.
    #[must_use]
    pub fn new(
        experiment_id: u64,
        run_number: u64,
        parameter_configs: Vec<ParameterConfig>,
        outcome: f64,
    ) -> Self {
        Self {
            id: None,
            experiment_id,
            run_number,
            parameter_configs,
            outcome,
            obj_parameters: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attaches objective-reported values.
    #[must_use]
    pub fn with_obj_parameters(
        mut self,
        obj_parameters: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        self.obj_parameters = obj_parameters;
        self
    }

    /// Cast parameter values keyed by name.
    #[must_use]
    pub fn values(&self) -> BTreeMap<String, ParamValue> {
        configs_to_values(&self.parameter_configs)
    }

    /// Dedup key of this trial's configuration.
    #[must_use]
    pub fn config_key(&self) -> String {
        config_key(&self.parameter_configs)
    }

    /// Returns `true` if this trial carries the failure sentinel outcome.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.outcome <= FAILED_TRIAL_OUTCOME
    }
}
