//! Suggestion bookkeeping shared by every optimizer variant.
//!
//! A [`SearchCore`] owns everything that is not strategy specific: binding to
//! an experiment, warm-start replay, the visited set used for duplicate
//! suppression, the best-so-far record, and the budget and convergence
//! policy. Strategies plug in through [`Proposer`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::experiment::Experiment;
use crate::objective::SECONDS_PER_DAY;
use crate::parameter::{ParameterConfig, SearchSpace, config_key};
use crate::trial::{FAILED_TRIAL_OUTCOME, Trial};

/// Resamples allowed when a suggestion matches an already-registered
/// configuration.
pub const MAX_RETRY_SUGGEST: usize = 10;

/// Smallest denominator used for the relative convergence gain.
const MIN_GAIN_SCALE: f64 = 1e-12;

/// A suggestion strategy.
///
/// Points are raw `f64` values in the declaration order of the bound
/// [`SearchSpace`].
pub(crate) trait Proposer: Send {
    /// Resets strategy state for a new space and returns how many live
    /// suggestions the strategy will make.
    fn bind(&mut self, space: &SearchSpace) -> Result<usize>;

    /// Proposes the next point. `issued` counts live suggestions already
    /// handed out; resamples of a duplicate see the same value.
    fn propose(&mut self, space: &SearchSpace, issued: usize) -> Vec<f64>;

    /// Feeds one observed outcome back into the strategy.
    fn observe(&mut self, point: &[f64], outcome: f64, failed: bool);
}

/// Early-stop policy for the live phase.
///
/// Budget accounting treats each outcome as a negated, day-scaled runtime:
/// a trial costs `-outcome * 86400` seconds. Convergence uses the relative
/// gain `(outcome - best) / max(|best|, 1e-12)` against the best outcome
/// registered before the trial; a gain above `converge_thres` resets the
/// stale counter, anything else increments it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StopPolicy {
    /// Total cost in seconds.
    #[serde(default)]
    pub budget: Option<f64>,
    /// Minimum relative gain that counts as an improvement.
    #[serde(default)]
    pub converge_thres: Option<f64>,
    /// Consecutive non-improving trials that stop the search.
    #[serde(default)]
    pub converge_steps: Option<usize>,
}

impl StopPolicy {
    /// Sets the cost budget in seconds.
    #[must_use]
    pub fn budget(mut self, seconds: f64) -> Self {
        self.budget = Some(seconds);
        self
    }

    /// Enables convergence stopping.
    #[must_use]
    pub fn convergence(mut self, thres: f64, steps: usize) -> Self {
        self.converge_thres = Some(thres);
        self.converge_steps = Some(steps);
        self
    }
}

/// Why an optimizer stopped producing configurations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// All planned suggestions were handed out.
    Exhausted,
    /// The cost budget ran out.
    Budget,
    /// Too many consecutive trials failed to improve.
    Converged,
}

impl core::fmt::Display for StopReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StopReason::Exhausted => f.write_str("exhausted"),
            StopReason::Budget => f.write_str("budget depleted"),
            StopReason::Converged => f.write_str("converged"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Accounting {
    Replay,
    Live,
    Failure,
}

pub(crate) struct SearchCore {
    proposer: Box<dyn Proposer>,
    policy: StopPolicy,
    dedupe: bool,
    space: Option<SearchSpace>,
    pending: Vec<Trial>,
    warm_started: bool,
    visited: HashMap<String, f64>,
    best: Option<(Vec<ParameterConfig>, f64)>,
    capacity: usize,
    issued: usize,
    registered: usize,
    remaining_budget: Option<f64>,
    stale_steps: usize,
    stop: Option<StopReason>,
}

impl SearchCore {
    pub(crate) fn new(proposer: Box<dyn Proposer>, policy: StopPolicy, dedupe: bool) -> Self {
        Self {
            proposer,
            policy,
            dedupe,
            space: None,
            pending: Vec::new(),
            warm_started: false,
            visited: HashMap::new(),
            best: None,
            capacity: 0,
            issued: 0,
            registered: 0,
            remaining_budget: policy.budget,
            stale_steps: 0,
            stop: None,
        }
    }

    pub(crate) fn policy(&self) -> StopPolicy {
        self.policy
    }

    pub(crate) fn set_experiment(&mut self, experiment: &Experiment, history: Vec<Trial>) -> Result<()> {
        let space = experiment.search_space()?;
        let capacity = self.proposer.bind(&space)?;

        self.space = Some(space);
        self.pending = history;
        self.warm_started = false;
        self.visited.clear();
        self.best = None;
        self.capacity = capacity;
        self.issued = 0;
        self.registered = 0;
        self.remaining_budget = self.policy.budget;
        self.stale_steps = 0;
        self.stop = None;

        tracing::debug!(
            tool = %experiment.tool_name,
            capacity,
            history = self.pending.len(),
            "optimizer bound to experiment"
        );
        Ok(())
    }

    pub(crate) fn warm_start(&mut self) -> Result<()> {
        if self.warm_started {
            return Ok(());
        }
        if self.space.is_none() {
            return Err(Error::NotBound);
        }

        let history = core::mem::take(&mut self.pending);
        for trial in &history {
            self.record(trial, Accounting::Replay)?;
        }
        self.warm_started = true;

        if !history.is_empty() {
            tracing::info!(
                trials = history.len(),
                best = self.best.as_ref().map(|(_, v)| *v),
                "replayed trial history"
            );
        }
        Ok(())
    }

    pub(crate) fn next_config(&mut self) -> Result<Option<Vec<ParameterConfig>>> {
        self.warm_start()?;
        if self.stop.is_some() {
            return Ok(None);
        }
        if self.issued >= self.capacity {
            tracing::info!(issued = self.issued, "suggestions exhausted");
            self.stop = Some(StopReason::Exhausted);
            return Ok(None);
        }

        let Some(space) = self.space.as_ref() else {
            return Err(Error::NotBound);
        };
        let mut point = self.proposer.propose(space, self.issued);

        if self.dedupe {
            let mut attempts = 0;
            loop {
                let key = config_key(&space.to_configs(&point));
                let Some(&prior) = self.visited.get(&key) else {
                    break;
                };
                if attempts == MAX_RETRY_SUGGEST {
                    return Err(Error::SuggestionExhausted { attempts });
                }
                attempts += 1;
                tracing::debug!(%key, attempts, "duplicate suggestion, resampling");
                // Registered as a budget-exempt duplicate to push the model away.
                self.proposer
                    .observe(&point, prior, prior <= FAILED_TRIAL_OUTCOME);
                point = self.proposer.propose(space, self.issued);
            }
        }

        self.issued += 1;
        let configs = space.to_configs(&point);
        tracing::debug!(
            issued = self.issued,
            capacity = self.capacity,
            config = %config_key(&configs),
            "suggested configuration"
        );
        Ok(Some(configs))
    }

    pub(crate) fn register(&mut self, trial: &Trial) -> Result<()> {
        self.warm_start()?;
        self.record(trial, Accounting::Live)
    }

    pub(crate) fn register_failure(&mut self, trial: &Trial) -> Result<()> {
        self.warm_start()?;
        self.record(trial, Accounting::Failure)
    }

    fn record(&mut self, trial: &Trial, accounting: Accounting) -> Result<()> {
        let (point, configs) = {
            let space = self.space.as_ref().ok_or(Error::NotBound)?;
            let point = space.to_point(&trial.parameter_configs)?;
            let configs = space.to_configs(&point);
            (point, configs)
        };

        self.visited.insert(config_key(&configs), trial.outcome);
        self.proposer.observe(&point, trial.outcome, trial.is_failure());
        self.registered += 1;

        let best_before = self.best.as_ref().map(|(_, v)| *v);
        if accounting == Accounting::Live {
            self.account(trial.outcome, best_before);
        }

        if best_before.is_none_or(|best| trial.outcome > best) {
            if accounting == Accounting::Live {
                tracing::info!(outcome = trial.outcome, config = %config_key(&configs), "new best");
            }
            self.best = Some((configs, trial.outcome));
        }
        Ok(())
    }

    fn account(&mut self, outcome: f64, best_before: Option<f64>) {
        if let Some(remaining) = &mut self.remaining_budget {
            *remaining -= -outcome * SECONDS_PER_DAY;
            if *remaining <= 0.0 && self.stop.is_none() {
                tracing::info!(remaining = *remaining, "budget depleted");
                self.stop = Some(StopReason::Budget);
            }
        }

        let (Some(thres), Some(steps), Some(best)) = (
            self.policy.converge_thres,
            self.policy.converge_steps,
            best_before,
        ) else {
            return;
        };
        let gain = (outcome - best) / best.abs().max(MIN_GAIN_SCALE);
        if gain > thres {
            self.stale_steps = 0;
        } else {
            self.stale_steps += 1;
        }
        if self.stale_steps >= steps && self.stop.is_none() {
            tracing::info!(stale_steps = self.stale_steps, "search converged");
            self.stop = Some(StopReason::Converged);
        }
    }

    pub(crate) fn get_max(&self) -> Option<(Vec<ParameterConfig>, f64)> {
        self.best.clone()
    }

    pub(crate) fn issued(&self) -> usize {
        self.issued
    }

    pub(crate) fn registered(&self) -> usize {
        self.registered
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.space.is_some()
    }
}
