//! Gaussian-process Bayesian optimization.
//!
//! The first `n_init` live suggestions are drawn uniformly at random. The
//! remaining `n_iter` maximize a [`Utility`] over the posterior of a GP fitted
//! to every registered trial, warm-started history included.
//!
//! # Configuration
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `n_init` | 2 | Random suggestions before the model is used |
//! | `n_iter` | 2 | Model-guided suggestions |
//! | `alpha` | 1e-6 | Observation noise added to the kernel diagonal |
//! | `utility` | `ucb`, kappa 2.5 | Acquisition function |
//! | `n_candidates` | 1000 | Random candidates scored per suggestion |
//! | `seed` | random | RNG seed |
//!
//! # Examples
//!
//! ```
//! use paropt::optimizer::{BayesianOptimizer, StopPolicy, Utility};
//!
//! let optimizer = BayesianOptimizer::builder()
//!     .n_init(5)
//!     .n_iter(20)
//!     .utility(Utility::ei(0.01))
//!     .policy(StopPolicy::default().budget(3600.0))
//!     .seed(7)
//!     .build();
//! assert_eq!(optimizer.n_init(), 5);
//! ```

use serde::{Deserialize, Serialize};

use super::gp::{
    GaussianProcess, MAX_TRAIN_POINTS, from_normalized, norm_cdf, norm_pdf, to_normalized,
};
use super::search::{Proposer, SearchCore, StopPolicy};
use crate::error::Result;
use crate::parameter::SearchSpace;
use crate::rng_util;

const DEFAULT_N_INIT: usize = 2;
const DEFAULT_N_ITER: usize = 2;
const DEFAULT_ALPHA: f64 = 1e-6;
const DEFAULT_KAPPA: f64 = 2.5;
const DEFAULT_N_CANDIDATES: usize = 1000;

/// Acquisition function family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtilityKind {
    /// Upper confidence bound: `mean + kappa * std`.
    #[default]
    Ucb,
    /// Expected improvement over the best observation plus `xi`.
    Ei,
    /// Probability of improvement over the best observation plus `xi`.
    Poi,
}

/// Acquisition function used to pick the next point.
///
/// `kappa` only affects UCB; `xi` only affects EI and POI. Both are applied
/// in standardized output units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Utility {
    /// Function family.
    #[serde(default)]
    pub kind: UtilityKind,
    /// Exploration weight for UCB.
    #[serde(default = "default_kappa")]
    pub kappa: f64,
    /// Improvement margin for EI and POI.
    #[serde(default)]
    pub xi: f64,
}

fn default_kappa() -> f64 {
    DEFAULT_KAPPA
}

impl Default for Utility {
    fn default() -> Self {
        Self::ucb(DEFAULT_KAPPA)
    }
}

impl Utility {
    /// Upper confidence bound.
    #[must_use]
    pub fn ucb(kappa: f64) -> Self {
        Self {
            kind: UtilityKind::Ucb,
            kappa,
            xi: 0.0,
        }
    }

    /// Expected improvement.
    #[must_use]
    pub fn ei(xi: f64) -> Self {
        Self {
            kind: UtilityKind::Ei,
            kappa: DEFAULT_KAPPA,
            xi,
        }
    }

    /// Probability of improvement.
    #[must_use]
    pub fn poi(xi: f64) -> Self {
        Self {
            kind: UtilityKind::Poi,
            kappa: DEFAULT_KAPPA,
            xi,
        }
    }

    /// Scores a posterior `(mean, std)` given the best observation.
    #[must_use]
    pub fn score(&self, mean: f64, std: f64, y_best: f64) -> f64 {
        match self.kind {
            UtilityKind::Ucb => mean + self.kappa * std,
            UtilityKind::Ei => {
                let improvement = mean - y_best - self.xi;
                if std < 1e-12 {
                    return improvement.max(0.0);
                }
                let z = improvement / std;
                (improvement * norm_cdf(z) + std * norm_pdf(z)).max(0.0)
            }
            UtilityKind::Poi => {
                let improvement = mean - y_best - self.xi;
                if std < 1e-12 {
                    return if improvement > 0.0 { 1.0 } else { 0.0 };
                }
                norm_cdf(improvement / std)
            }
        }
    }
}

/// Bayesian optimizer backed by a Gaussian process.
pub struct BayesianOptimizer {
    pub(crate) core: SearchCore,
    n_init: usize,
    n_iter: usize,
    alpha: f64,
    utility: Utility,
}

impl BayesianOptimizer {
    /// Creates an optimizer with `n_init` random and `n_iter` guided
    /// suggestions and all other options defaulted.
    #[must_use]
    pub fn new(n_init: usize, n_iter: usize) -> Self {
        Self::builder().n_init(n_init).n_iter(n_iter).build()
    }

    /// Creates a builder.
    #[must_use]
    pub fn builder() -> BayesianOptimizerBuilder {
        BayesianOptimizerBuilder::default()
    }

    /// Number of random initial suggestions.
    #[must_use]
    pub fn n_init(&self) -> usize {
        self.n_init
    }

    /// Number of model-guided suggestions.
    #[must_use]
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Observation noise.
    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Acquisition function.
    #[must_use]
    pub fn utility(&self) -> Utility {
        self.utility
    }
}

impl Default for BayesianOptimizer {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`BayesianOptimizer`].
#[derive(Clone, Debug, Default)]
pub struct BayesianOptimizerBuilder {
    n_init: Option<usize>,
    n_iter: Option<usize>,
    alpha: Option<f64>,
    utility: Option<Utility>,
    n_candidates: Option<usize>,
    policy: StopPolicy,
    seed: Option<u64>,
}

impl BayesianOptimizerBuilder {
    /// Sets the number of random initial suggestions. Default: 2.
    #[must_use]
    pub fn n_init(mut self, n: usize) -> Self {
        self.n_init = Some(n);
        self
    }

    /// Sets the number of model-guided suggestions. Default: 2.
    #[must_use]
    pub fn n_iter(mut self, n: usize) -> Self {
        self.n_iter = Some(n);
        self
    }

    /// Sets the observation noise added to the kernel diagonal. Default: 1e-6.
    #[must_use]
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    /// Sets the UCB exploration weight, switching the utility to UCB.
    #[must_use]
    pub fn kappa(mut self, kappa: f64) -> Self {
        self.utility = Some(Utility::ucb(kappa));
        self
    }

    /// Sets the acquisition function. Default: UCB with kappa 2.5.
    #[must_use]
    pub fn utility(mut self, utility: Utility) -> Self {
        self.utility = Some(utility);
        self
    }

    /// Sets how many random candidates are scored per suggestion. Default: 1000.
    #[must_use]
    pub fn n_candidates(mut self, n: usize) -> Self {
        self.n_candidates = Some(n);
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

    /// Builds the optimizer.
    #[must_use]
    pub fn build(self) -> BayesianOptimizer {
        let n_init = self.n_init.unwrap_or(DEFAULT_N_INIT);
        let n_iter = self.n_iter.unwrap_or(DEFAULT_N_ITER);
        let alpha = self.alpha.unwrap_or(DEFAULT_ALPHA);
        let utility = self.utility.unwrap_or_default();
        let proposer = GpProposer {
            rng: rng_util::make_rng(self.seed),
            n_init,
            n_iter,
            alpha,
            utility,
            n_candidates: self.n_candidates.unwrap_or(DEFAULT_N_CANDIDATES).max(1),
            bounds: Vec::new(),
            observations: Vec::new(),
        };
        BayesianOptimizer {
            core: SearchCore::new(Box::new(proposer), self.policy, true),
            n_init,
            n_iter,
            alpha,
            utility,
        }
    }
}

struct Observation {
    x: Vec<f64>,
    y: f64,
    failed: bool,
}

struct GpProposer {
    rng: fastrand::Rng,
    n_init: usize,
    n_iter: usize,
    alpha: f64,
    utility: Utility,
    n_candidates: usize,
    bounds: Vec<(f64, f64)>,
    observations: Vec<Observation>,
}

impl GpProposer {
    /// Training set of the most recent observations, with failures imputed
    /// as the worst real outcome.
    fn training_data(&self) -> Option<(Vec<Vec<f64>>, Vec<f64>)> {
        let start = self.observations.len().saturating_sub(MAX_TRAIN_POINTS);
        let recent = &self.observations[start..];
        let worst = recent
            .iter()
            .filter(|o| !o.failed)
            .map(|o| o.y)
            .fold(None, |acc: Option<f64>, y| Some(acc.map_or(y, |a| a.min(y))))?;

        let x = recent.iter().map(|o| o.x.clone()).collect();
        let y = recent
            .iter()
            .map(|o| if o.failed { worst } else { o.y })
            .collect();
        Some((x, y))
    }

    fn maximize(&mut self, gp: &GaussianProcess) -> Vec<f64> {
        let d = self.bounds.len();
        let mut best_score = f64::NEG_INFINITY;
        let mut best_x = vec![0.5; d];
        for _ in 0..self.n_candidates {
            let x: Vec<f64> = (0..d).map(|_| self.rng.f64()).collect();
            let (mean, std) = gp.predict(&x);
            let score = self.utility.score(mean, std, gp.y_best());
            if score > best_score {
                best_score = score;
                best_x = x;
            }
        }
        best_x
    }
}

impl Proposer for GpProposer {
    fn bind(&mut self, space: &SearchSpace) -> Result<usize> {
        self.bounds = space.bounds();
        self.observations.clear();
        Ok(self.n_init + self.n_iter)
    }

    fn propose(&mut self, _space: &SearchSpace, issued: usize) -> Vec<f64> {
        let model = if issued < self.n_init {
            None
        } else {
            self.training_data()
                .and_then(|(x, y)| GaussianProcess::fit(&x, &y, self.alpha))
        };

        let Some(gp) = model else {
            return rng_util::uniform_point(&mut self.rng, &self.bounds);
        };
        let normalized = self.maximize(&gp);
        normalized
            .iter()
            .zip(&self.bounds)
            .map(|(&v, &(lo, hi))| from_normalized(v, lo, hi))
            .collect()
    }

    fn observe(&mut self, point: &[f64], outcome: f64, failed: bool) {
        let x = point
            .iter()
            .zip(&self.bounds)
            .map(|(&v, &(lo, hi))| to_normalized(v, lo, hi))
            .collect();
        self.observations.push(Observation {
            x,
            y: outcome,
            failed,
        });
    }
}
