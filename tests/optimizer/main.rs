mod bayesian;
mod coordinate;
mod grid;
mod random;
mod stopping;
mod warm_start;

use paropt::experiment::Experiment;
use paropt::parameter::{Parameter, ParameterConfig};
use paropt::{Optimizer, Trial};

/// Single-parameter experiment over `x`.
pub fn experiment_x(param: Parameter) -> Experiment {
    Experiment::new("tool", "run ${x}").parameter(param)
}

/// Value of the first configuration, widened to `f64`.
pub fn first_value(configs: &[ParameterConfig]) -> f64 {
    configs[0].cast().as_f64()
}

/// Pulls every suggestion, registering `f(x)` for each.
pub fn drain(optimizer: &mut Optimizer, f: impl Fn(f64) -> f64) -> Vec<f64> {
    let mut xs = Vec::new();
    while let Some(configs) = optimizer.next_config().unwrap() {
        let x = first_value(&configs);
        optimizer
            .register(&Trial::new(0, 0, configs, f(x)))
            .unwrap();
        xs.push(x);
    }
    xs
}
