use paropt::optimizer::BayesianOptimizer;
use paropt::parameter::Parameter;
use paropt::{Error, Optimizer, Trial};

use crate::{experiment_x, first_value};

fn history() -> (paropt::Experiment, Vec<Trial>) {
    let exp = experiment_x(Parameter::float("x", 0.0, 10.0));
    let space = exp.search_space().unwrap();
    let trials = [(3.0, -3.0), (1.0, -1.0), (2.0, -2.0)]
        .into_iter()
        .map(|(x, y)| Trial::new(0, 0, space.to_configs(&[x]), y))
        .collect();
    (exp, trials)
}

#[test]
fn history_is_replayed_before_new_suggestions() {
    let (exp, trials) = history();
    let mut optimizer = Optimizer::from(
        BayesianOptimizer::builder()
            .n_init(2)
            .n_iter(2)
            .seed(17)
            .build(),
    );
    optimizer.set_experiment(&exp, trials).unwrap();
    optimizer.warm_start().unwrap();

    assert_eq!(optimizer.registered(), 3);
    assert_eq!(optimizer.issued(), 0);
    let (best, outcome) = optimizer.get_max().unwrap();
    assert_eq!(first_value(&best), 1.0);
    assert_eq!(outcome, -1.0);

    let mut suggestions = 0;
    while let Some(configs) = optimizer.next_config().unwrap() {
        let x = first_value(&configs);
        optimizer
            .register(&Trial::new(0, 0, configs, -(x - 5.0).abs()))
            .unwrap();
        suggestions += 1;
    }
    assert_eq!(suggestions, 4);
    assert_eq!(optimizer.registered(), 7);
}

#[test]
fn first_suggestion_triggers_replay() {
    let (exp, trials) = history();
    let mut optimizer = Optimizer::from(BayesianOptimizer::new(2, 2));
    optimizer.set_experiment(&exp, trials).unwrap();
    assert_eq!(optimizer.registered(), 0);

    optimizer.next_config().unwrap().unwrap();
    assert_eq!(optimizer.registered(), 3);
    assert_eq!(optimizer.get_max().unwrap().1, -1.0);
}

#[test]
fn history_with_unknown_parameter_fails() {
    let (exp, _) = history();
    let stray = Trial::new(
        0,
        0,
        vec![paropt::parameter::ParameterConfig::new(
            Parameter::float("y", 0.0, 1.0),
            0.5,
        )],
        0.0,
    );
    let mut optimizer = Optimizer::from(BayesianOptimizer::new(1, 1));
    optimizer.set_experiment(&exp, vec![stray]).unwrap();
    assert!(matches!(
        optimizer.warm_start(),
        Err(Error::UnknownParameter(name)) if name == "y"
    ));
}

#[test]
fn rebinding_resets_state() {
    let (exp, trials) = history();
    let mut optimizer = Optimizer::from(BayesianOptimizer::new(1, 1));
    optimizer.set_experiment(&exp, trials).unwrap();
    optimizer.warm_start().unwrap();
    assert!(optimizer.get_max().is_some());

    optimizer.set_experiment(&exp, Vec::new()).unwrap();
    optimizer.warm_start().unwrap();
    assert!(optimizer.get_max().is_none());
    assert_eq!(optimizer.registered(), 0);
}
