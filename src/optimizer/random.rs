//! Uniform random search.

use super::search::{Proposer, SearchCore, StopPolicy};
use crate::error::Result;
use crate::parameter::SearchSpace;
use crate::rng_util;

const DEFAULT_N_ITER: usize = 10;

/// Draws `n_iter` configurations uniformly over each parameter's range.
///
/// Shares duplicate suppression, budget and convergence handling with
/// [`BayesianOptimizer`](super::BayesianOptimizer).
///
/// # Examples
///
/// ```
/// use paropt::optimizer::RandomSearch;
///
/// let search = RandomSearch::builder().n_iter(25).seed(42).build();
/// assert_eq!(search.n_iter(), 25);
/// ```
pub struct RandomSearch {
    pub(crate) core: SearchCore,
    n_iter: usize,
}

impl RandomSearch {
    /// Creates a search of `n_iter` draws with a random seed.
    #[must_use]
    pub fn new(n_iter: usize) -> Self {
        Self::builder().n_iter(n_iter).build()
    }

    /// Creates a builder.
    #[must_use]
    pub fn builder() -> RandomSearchBuilder {
        RandomSearchBuilder::default()
    }

    /// Number of draws.
    #[must_use]
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }
}

/// Builder for [`RandomSearch`].
#[derive(Clone, Debug, Default)]
pub struct RandomSearchBuilder {
    n_iter: Option<usize>,
    policy: StopPolicy,
    seed: Option<u64>,
}

impl RandomSearchBuilder {
    /// Sets the number of draws. Default: 10.
    #[must_use]
    pub fn n_iter(mut self, n: usize) -> Self {
        self.n_iter = Some(n);
        self
    }

    /// Sets the budget and convergence policy.
    #[must_use]
    pub fn policy(mut self, policy: StopPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the RNG seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builds the search.
    #[must_use]
    pub fn build(self) -> RandomSearch {
        let n_iter = self.n_iter.unwrap_or(DEFAULT_N_ITER);
        let proposer = UniformProposer {
            rng: rng_util::make_rng(self.seed),
            n_iter,
            bounds: Vec::new(),
        };
        RandomSearch {
            core: SearchCore::new(Box::new(proposer), self.policy, true),
            n_iter,
        }
    }
}

struct UniformProposer {
    rng: fastrand::Rng,
    n_iter: usize,
    bounds: Vec<(f64, f64)>,
}

impl Proposer for UniformProposer {
    fn bind(&mut self, space: &SearchSpace) -> Result<usize> {
        self.bounds = space.bounds();
        Ok(self.n_iter)
    }

    fn propose(&mut self, _space: &SearchSpace, _issued: usize) -> Vec<f64> {
        rng_util::uniform_point(&mut self.rng, &self.bounds)
    }

    fn observe(&mut self, _point: &[f64], _outcome: f64, _failed: bool) {}
}
