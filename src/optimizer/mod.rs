//! Suggestion engines.
//!
//! [`Optimizer`] is a closed set of strategies sharing one protocol:
//!
//! 1. [`set_experiment`](Optimizer::set_experiment) binds the parameter space
//!    and hands over previously persisted trials.
//! 2. The first [`next_config`](Optimizer::next_config) replays that history
//!    into the model (warm start) without consuming any budget.
//! 3. Each configuration is executed by the caller and reported back through
//!    [`register`](Optimizer::register) before the next one is requested.
//!
//! `next_config` returning `Ok(None)` is the normal end of a search: the
//! planned suggestions ran out, the budget was spent, or the search
//! converged (see [`StopReason`]).

mod bayesian;
mod coordinate;
mod gp;
mod grid;
mod random;
mod search;

pub use self::bayesian::{BayesianOptimizer, BayesianOptimizerBuilder, Utility, UtilityKind};
pub use self::coordinate::{CoordinateSearch, CoordinateSearchBuilder};
pub use self::grid::GridSearch;
pub use self::random::{RandomSearch, RandomSearchBuilder};
pub use self::search::{MAX_RETRY_SUGGEST, StopPolicy, StopReason};

use self::search::SearchCore;
use crate::error::Result;
use crate::experiment::Experiment;
use crate::parameter::ParameterConfig;
use crate::trial::Trial;

/// One of the supported search strategies.
pub enum Optimizer {
    /// Gaussian-process Bayesian optimization.
    Bayesian(BayesianOptimizer),
    /// Exhaustive grid.
    Grid(GridSearch),
    /// Uniform random draws.
    Random(RandomSearch),
    /// Coordinate hill climbing.
    Coordinate(CoordinateSearch),
}

impl Optimizer {
    fn core(&self) -> &SearchCore {
        match self {
            Optimizer::Bayesian(o) => &o.core,
            Optimizer::Grid(o) => &o.core,
            Optimizer::Random(o) => &o.core,
            Optimizer::Coordinate(o) => &o.core,
        }
    }

    fn core_mut(&mut self) -> &mut SearchCore {
        match self {
            Optimizer::Bayesian(o) => &mut o.core,
            Optimizer::Grid(o) => &mut o.core,
            Optimizer::Random(o) => &mut o.core,
            Optimizer::Coordinate(o) => &mut o.core,
        }
    }

    /// Short name of the strategy, as used in configuration files.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Optimizer::Bayesian(_) => "bayesopt",
            Optimizer::Grid(_) => "grid",
            Optimizer::Random(_) => "random",
            Optimizer::Coordinate(_) => "coordinate",
        }
    }

    /// Binds the optimizer to `experiment` and queues `history` (in
    /// chronological order) for warm-start replay.
    ///
    /// Rebinding resets all search state.
    ///
    /// # Errors
    ///
    /// Returns an error if the experiment's parameters are invalid, or
    /// [`Error::InvalidGrid`](crate::Error::InvalidGrid) if a grid does not
    /// fit them.
    pub fn set_experiment(&mut self, experiment: &Experiment, history: Vec<Trial>) -> Result<()> {
        self.core_mut().set_experiment(experiment, history)
    }

    /// Replays queued history into the model. Idempotent; `next_config` calls
    /// it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBound`](crate::Error::NotBound) before
    /// `set_experiment`, or
    /// [`Error::UnknownParameter`](crate::Error::UnknownParameter) if a
    /// historical trial does not fit the experiment.
    pub fn warm_start(&mut self) -> Result<()> {
        self.core_mut().warm_start()
    }

    /// Returns the next configuration to try, or `None` when the search is
    /// over.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SuggestionExhausted`](crate::Error::SuggestionExhausted)
    /// when every resample hit an already-registered configuration, and the
    /// errors of [`warm_start`](Self::warm_start).
    pub fn next_config(&mut self) -> Result<Option<Vec<ParameterConfig>>> {
        self.core_mut().next_config()
    }

    /// Records a completed trial. Counts towards budget and convergence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownParameter`](crate::Error::UnknownParameter) or
    /// [`Error::IncompleteConfig`](crate::Error::IncompleteConfig) if the
    /// trial does not fit the bound experiment.
    pub fn register(&mut self, trial: &Trial) -> Result<()> {
        self.core_mut().register(trial)
    }

    /// Records a failed trial. Marks the configuration as visited and informs
    /// the model, but leaves budget and convergence untouched.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_failure(&mut self, trial: &Trial) -> Result<()> {
        self.core_mut().register_failure(trial)
    }

    /// Best configuration and outcome over every registered trial, warm-start
    /// history included.
    #[must_use]
    pub fn get_max(&self) -> Option<(Vec<ParameterConfig>, f64)> {
        self.core().get_max()
    }

    /// Live suggestions handed out since binding.
    #[must_use]
    pub fn issued(&self) -> usize {
        self.core().issued()
    }

    /// Trials registered since binding, replayed history included.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.core().registered()
    }

    /// Planned number of live suggestions for the bound experiment.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.core().capacity()
    }

    /// Why the search ended, if it has.
    #[must_use]
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.core().stop_reason()
    }

    /// Budget and convergence settings.
    #[must_use]
    pub fn policy(&self) -> StopPolicy {
        self.core().policy()
    }

    /// Returns `true` once `set_experiment` has succeeded.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.core().is_bound()
    }
}

impl Default for Optimizer {
    /// Bayesian optimization with two random and two guided suggestions.
    fn default() -> Self {
        Optimizer::Bayesian(BayesianOptimizer::default())
    }
}

impl core::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Optimizer")
            .field("kind", &self.name())
            .field("issued", &self.issued())
            .field("capacity", &self.capacity())
            .field("stop_reason", &self.stop_reason())
            .finish()
    }
}

impl From<BayesianOptimizer> for Optimizer {
    fn from(o: BayesianOptimizer) -> Self {
        Optimizer::Bayesian(o)
    }
}

impl From<GridSearch> for Optimizer {
    fn from(o: GridSearch) -> Self {
        Optimizer::Grid(o)
    }
}

impl From<RandomSearch> for Optimizer {
    fn from(o: RandomSearch) -> Self {
        Optimizer::Random(o)
    }
}

impl From<CoordinateSearch> for Optimizer {
    fn from(o: CoordinateSearch) -> Self {
        Optimizer::Coordinate(o)
    }
}
