mod failures;
mod workflow;

use paropt::Experiment;
use paropt::parameter::Parameter;
use paropt::template::RunConfig;

/// `sleep ${x}` with `x` an integer in `[0, 10]`.
pub fn sleeper() -> Experiment {
    Experiment::new("sleeper", "sleep ${x}").parameter(Parameter::int("x", 0, 10))
}

/// Cast value of `x` in a rendered run.
pub fn x_of(run: &RunConfig) -> f64 {
    run.values["x"].as_f64()
}
