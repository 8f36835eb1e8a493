use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{ResolvedExperiment, Storage, next_run_number, validate_trial};
use crate::error::{Error, Result};
use crate::experiment::Experiment;
use crate::trial::Trial;

/// In-memory storage.
///
/// Clones share the same underlying data, so one store can back several
/// runners in a process.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    experiments: Vec<(String, Experiment)>,
    trials: Vec<Trial>,
    last_runs: HashMap<u64, u64>,
    next_experiment_id: u64,
    next_trial_id: u64,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored experiments.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.state.read().experiments.len()
    }

    /// Number of stored trials across all experiments.
    #[must_use]
    pub fn trial_count(&self) -> usize {
        self.state.read().trials.len()
    }
}

impl MemoryState {
    fn find(&self, id: u64) -> Option<&Experiment> {
        self.experiments
            .iter()
            .map(|(_, e)| e)
            .find(|e| e.id == Some(id))
    }

    fn last_run_number(&self, id: u64) -> Option<u64> {
        let from_trials = self
            .trials
            .iter()
            .filter(|t| t.experiment_id == id)
            .map(|t| t.run_number)
            .max();
        from_trials.max(self.last_runs.get(&id).copied())
    }
}

impl Storage for MemoryStorage {
    fn get_or_create_experiment(&self, experiment: &Experiment) -> Result<ResolvedExperiment> {
        let hash = experiment.content_hash();
        let mut state = self.state.write();

        if let Some((_, stored)) = state.experiments.iter().find(|(h, _)| *h == hash) {
            let stored = stored.clone();
            let last_run_number = stored.id.and_then(|id| state.last_run_number(id));
            return Ok(ResolvedExperiment {
                experiment: stored,
                last_run_number,
                created: false,
            });
        }

        experiment.search_space()?;
        let id = state.next_experiment_id;
        state.next_experiment_id += 1;
        let mut stored = experiment.clone();
        stored.id = Some(id);
        state.experiments.push((hash, stored.clone()));

        Ok(ResolvedExperiment {
            experiment: stored,
            last_run_number: None,
            created: true,
        })
    }

    fn save_result(&self, mut trial: Trial) -> Result<Trial> {
        let mut state = self.state.write();
        let experiment = state
            .find(trial.experiment_id)
            .ok_or_else(|| Error::Storage(format!("unknown experiment {}", trial.experiment_id)))?;
        validate_trial(experiment, &trial)?;

        trial.id = Some(state.next_trial_id);
        state.next_trial_id += 1;
        state.trials.push(trial.clone());
        Ok(trial)
    }

    fn start_run(&self, experiment_id: u64) -> Result<u64> {
        let mut state = self.state.write();
        if state.find(experiment_id).is_none() {
            return Err(Error::Storage(format!("unknown experiment {experiment_id}")));
        }
        let run_number = next_run_number(state.last_run_number(experiment_id));
        state.last_runs.insert(experiment_id, run_number);
        Ok(run_number)
    }

    fn trials(&self, experiment_id: u64) -> Result<Vec<Trial>> {
        Ok(self
            .state
            .read()
            .trials
            .iter()
            .filter(|t| t.experiment_id == experiment_id)
            .cloned()
            .collect())
    }

    fn experiment(&self, id: u64) -> Result<Option<Experiment>> {
        Ok(self.state.read().find(id).cloned())
    }
}
