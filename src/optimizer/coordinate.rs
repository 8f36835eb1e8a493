//! Coordinate search: one-axis-at-a-time hill climbing around the incumbent.
//!
//! After `n_init` random suggestions, each suggestion moves the best point
//! seen so far by `±step` along one axis, cycling through axes and both
//! directions. A full sweep with no improvement halves the step; once the
//! step falls below a floor the search restarts from a random point with the
//! initial step.

use super::search::{Proposer, SearchCore, StopPolicy};
use crate::error::Result;
use crate::parameter::{ParamType, SearchSpace};
use crate::rng_util;

const DEFAULT_N_INIT: usize = 1;
const DEFAULT_N_ITER: usize = 10;
/// Initial step as a fraction of each parameter's range.
const INITIAL_STEP: f64 = 0.25;
const MIN_STEP: f64 = 1e-3;

/// Coordinate search with a shrinking step.
///
/// # Examples
///
/// ```
/// use paropt::optimizer::CoordinateSearch;
///
/// let search = CoordinateSearch::builder().n_init(2).n_iter(30).build();
/// assert_eq!(search.n_iter(), 30);
/// ```
pub struct CoordinateSearch {
    pub(crate) core: SearchCore,
    n_init: usize,
    n_iter: usize,
}

impl CoordinateSearch {
    /// Creates a search with `n_init` random and `n_iter` coordinate moves.
    #[must_use]
    pub fn new(n_init: usize, n_iter: usize) -> Self {
        Self::builder().n_init(n_init).n_iter(n_iter).build()
    }

    /// Creates a builder.
    #[must_use]
    pub fn builder() -> CoordinateSearchBuilder {
        CoordinateSearchBuilder::default()
    }

    /// Number of random initial suggestions.
    #[must_use]
    pub fn n_init(&self) -> usize {
        self.n_init
    }

    /// Number of coordinate moves.
    #[must_use]
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }
}

/// Builder for [`CoordinateSearch`].
#[derive(Clone, Debug, Default)]
pub struct CoordinateSearchBuilder {
    n_init: Option<usize>,
    n_iter: Option<usize>,
    policy: StopPolicy,
    seed: Option<u64>,
}

impl CoordinateSearchBuilder {
    /// Sets the number of random initial suggestions. Default: 1.
    #[must_use]
    pub fn n_init(mut self, n: usize) -> Self {
        self.n_init = Some(n);
        self
    }

    /// Sets the number of coordinate moves. Default: 10.
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
    pub fn build(self) -> CoordinateSearch {
        let proposer = self.proposer();
        CoordinateSearch {
            n_init: proposer.n_init,
            n_iter: proposer.n_iter,
            core: SearchCore::new(Box::new(proposer), self.policy, true),
        }
    }

    fn proposer(&self) -> CoordinateProposer {
        CoordinateProposer {
            rng: rng_util::make_rng(self.seed),
            n_init: self.n_init.unwrap_or(DEFAULT_N_INIT),
            n_iter: self.n_iter.unwrap_or(DEFAULT_N_ITER),
            bounds: Vec::new(),
            integer: Vec::new(),
            incumbent: None,
            move_index: 0,
            step: INITIAL_STEP,
            improved: false,
        }
    }
}

struct CoordinateProposer {
    rng: fastrand::Rng,
    n_init: usize,
    n_iter: usize,
    bounds: Vec<(f64, f64)>,
    integer: Vec<bool>,
    incumbent: Option<(Vec<f64>, f64)>,
    /// Position in the current sweep: axis `i / 2`, direction by parity.
    move_index: usize,
    step: f64,
    improved: bool,
}

impl CoordinateProposer {
    fn end_sweep(&mut self) {
        self.move_index = 0;
        if !self.improved {
            self.step /= 2.0;
        }
        self.improved = false;
    }
}

impl Proposer for CoordinateProposer {
    fn bind(&mut self, space: &SearchSpace) -> Result<usize> {
        self.bounds = space.bounds();
        self.integer = space
            .parameters()
            .iter()
            .map(|p| p.kind == ParamType::Int)
            .collect();
        self.incumbent = None;
        self.move_index = 0;
        self.step = INITIAL_STEP;
        self.improved = false;
        Ok(self.n_init + self.n_iter)
    }

    fn propose(&mut self, _space: &SearchSpace, issued: usize) -> Vec<f64> {
        if self.bounds.is_empty() {
            return Vec::new();
        }
        if self.step < MIN_STEP {
            tracing::debug!("coordinate step collapsed, restarting from a random point");
            self.step = INITIAL_STEP;
            self.move_index = 0;
            self.improved = false;
            return rng_util::uniform_point(&mut self.rng, &self.bounds);
        }
        let Some((center, _)) = self.incumbent.as_ref().filter(|_| issued >= self.n_init) else {
            return rng_util::uniform_point(&mut self.rng, &self.bounds);
        };

        let axis = self.move_index / 2;
        let sign = if self.move_index % 2 == 0 { 1.0 } else { -1.0 };
        let (lo, hi) = self.bounds[axis];
        let mut delta = self.step * (hi - lo);
        if self.integer[axis] {
            delta = delta.max(1.0);
        }

        let mut point = center.clone();
        point[axis] = (point[axis] + sign * delta).clamp(lo, hi);

        self.move_index += 1;
        if self.move_index >= 2 * self.bounds.len() {
            self.end_sweep();
        }
        point
    }

    fn observe(&mut self, point: &[f64], outcome: f64, failed: bool) {
        if failed {
            return;
        }
        let better = self
            .incumbent
            .as_ref()
            .is_none_or(|(_, best)| outcome > *best);
        if better {
            if self.incumbent.is_some() {
                self.improved = true;
            }
            self.incumbent = Some((point.to_vec(), outcome));
        }
    }
}
