use std::collections::HashSet;

use paropt::optimizer::{MAX_RETRY_SUGGEST, RandomSearch};
use paropt::parameter::{Parameter, config_key};
use paropt::{Error, Optimizer, Trial};

use crate::{drain, experiment_x};

#[test]
fn draws_n_iter_points_in_range() {
    let mut optimizer = Optimizer::from(RandomSearch::builder().n_iter(25).seed(42).build());
    optimizer
        .set_experiment(&experiment_x(Parameter::float("x", -2.0, 3.0)), Vec::new())
        .unwrap();

    let xs = drain(&mut optimizer, |x| -x * x);
    assert_eq!(xs.len(), 25);
    assert!(xs.iter().all(|x| (-2.0..=3.0).contains(x)));
    assert_eq!(optimizer.registered(), 25);
}

#[test]
fn never_returns_a_registered_configuration() {
    let mut optimizer = Optimizer::from(RandomSearch::builder().n_iter(6).seed(7).build());
    optimizer
        .set_experiment(&experiment_x(Parameter::int("x", 0, 9)), Vec::new())
        .unwrap();

    let mut seen = HashSet::new();
    while let Some(configs) = optimizer.next_config().unwrap() {
        assert!(seen.insert(config_key(&configs)), "duplicate {configs:?}");
        optimizer.register(&Trial::new(0, 0, configs, 0.0)).unwrap();
    }
    assert_eq!(seen.len(), 6);
}

#[test]
fn single_point_space_exhausts_suggestions() {
    let mut optimizer = Optimizer::from(RandomSearch::builder().n_iter(3).seed(1).build());
    optimizer
        .set_experiment(&experiment_x(Parameter::int("x", 4, 4)), Vec::new())
        .unwrap();

    let configs = optimizer.next_config().unwrap().unwrap();
    optimizer.register(&Trial::new(0, 0, configs, -1.0)).unwrap();

    let err = optimizer.next_config().unwrap_err();
    assert!(matches!(
        err,
        Error::SuggestionExhausted { attempts } if attempts == MAX_RETRY_SUGGEST
    ));
}

#[test]
fn unbound_optimizer_reports_not_bound() {
    let mut optimizer = Optimizer::from(RandomSearch::new(3));
    assert!(!optimizer.is_bound());
    assert!(matches!(optimizer.next_config(), Err(Error::NotBound)));
}
