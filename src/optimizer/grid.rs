//! Exhaustive grid search.
//!
//! Each parameter `i` is discretized into `num_configs_per_param[i]` evenly
//! spaced points between its bounds (inclusive) and the full cartesian
//! product is yielded once, in row-major order with the last parameter
//! varying fastest. Registered outcomes only update the best-so-far record.

use super::search::{Proposer, SearchCore, StopPolicy};
use crate::error::{Error, Result};
use crate::parameter::{ParamType, Parameter, SearchSpace};

/// Grid search over a fixed number of points per parameter.
///
/// # Examples
///
/// ```
/// use paropt::experiment::Experiment;
/// use paropt::optimizer::{GridSearch, Optimizer};
/// use paropt::parameter::Parameter;
///
/// let experiment = Experiment::new("t", "run ${x}").parameter(Parameter::int("x", 0, 10));
/// let mut optimizer = Optimizer::from(GridSearch::new(vec![3]));
/// optimizer.set_experiment(&experiment, Vec::new()).unwrap();
///
/// let mut xs = Vec::new();
/// while let Some(configs) = optimizer.next_config().unwrap() {
///     xs.push(configs[0].cast().to_string());
/// }
/// assert_eq!(xs, ["0", "5", "10"]);
/// ```
pub struct GridSearch {
    pub(crate) core: SearchCore,
    num_configs_per_param: Vec<usize>,
}

impl GridSearch {
    /// Creates a grid with `num_configs_per_param[i]` points for the `i`-th
    /// declared parameter.
    #[must_use]
    pub fn new(num_configs_per_param: Vec<usize>) -> Self {
        let proposer = GridProposer {
            num_configs_per_param: num_configs_per_param.clone(),
            axes: Vec::new(),
        };
        Self {
            core: SearchCore::new(Box::new(proposer), StopPolicy::default(), false),
            num_configs_per_param,
        }
    }

    /// Points per parameter.
    #[must_use]
    pub fn num_configs_per_param(&self) -> &[usize] {
        &self.num_configs_per_param
    }
}

/// `n` evenly spaced values over `[low, high]`, endpoints included.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn linspace(low: f64, high: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![low],
        _ => (0..n)
            .map(|i| {
                if i == n - 1 {
                    high
                } else {
                    (low + i as f64 / (n - 1) as f64 * (high - low)).clamp(low, high)
                }
            })
            .collect(),
    }
}

#[allow(clippy::cast_precision_loss)]
fn axis(parameter: &Parameter, n: usize) -> Result<Vec<f64>> {
    if n == 0 {
        return Err(Error::InvalidGrid(format!(
            "parameter '{}' needs at least one point",
            parameter.name
        )));
    }
    let distinct = match parameter.kind {
        ParamType::Int => parameter.span().floor() + 1.0,
        ParamType::Float if parameter.span() > 0.0 => f64::INFINITY,
        ParamType::Float => 1.0,
    };
    if n as f64 > distinct {
        return Err(Error::InvalidGrid(format!(
            "parameter '{}' has {distinct} distinct values but {n} points were requested",
            parameter.name
        )));
    }
    Ok(linspace(parameter.minimum, parameter.maximum, n))
}

struct GridProposer {
    num_configs_per_param: Vec<usize>,
    axes: Vec<Vec<f64>>,
}

impl Proposer for GridProposer {
    fn bind(&mut self, space: &SearchSpace) -> Result<usize> {
        if self.num_configs_per_param.len() != space.len() {
            return Err(Error::InvalidGrid(format!(
                "{} point counts given for {} parameters",
                self.num_configs_per_param.len(),
                space.len()
            )));
        }
        self.axes = space
            .parameters()
            .iter()
            .zip(&self.num_configs_per_param)
            .map(|(p, &n)| axis(p, n))
            .collect::<Result<_>>()?;
        Ok(self.axes.iter().map(Vec::len).product())
    }

    fn propose(&mut self, _space: &SearchSpace, issued: usize) -> Vec<f64> {
        let mut rest = issued;
        let mut point = vec![0.0; self.axes.len()];
        for (slot, axis) in point.iter_mut().zip(&self.axes).rev() {
            *slot = axis[rest % axis.len()];
            rest /= axis.len();
        }
        point
    }

    fn observe(&mut self, _point: &[f64], _outcome: f64, _failed: bool) {}
}
