use std::collections::HashSet;

use paropt::optimizer::GridSearch;
use paropt::parameter::{ParamType, Parameter, config_key};
use paropt::{Error, Optimizer};
use proptest::prelude::*;

use crate::{drain, experiment_x};

#[test]
fn three_points_over_zero_to_ten() {
    let mut optimizer = Optimizer::from(GridSearch::new(vec![3]));
    optimizer
        .set_experiment(&experiment_x(Parameter::int("x", 0, 10)), Vec::new())
        .unwrap();

    let mut xs = drain(&mut optimizer, |x| -x);
    xs.sort_by(f64::total_cmp);
    assert_eq!(xs, [0.0, 5.0, 10.0]);

    let (best, outcome) = optimizer.get_max().unwrap();
    assert_eq!(best[0].cast().as_f64(), 0.0);
    assert_eq!(outcome, 0.0);
}

#[test]
fn exhausted_grid_stays_exhausted() {
    let mut optimizer = Optimizer::from(GridSearch::new(vec![2]));
    optimizer
        .set_experiment(&experiment_x(Parameter::float("x", -1.0, 1.0)), Vec::new())
        .unwrap();
    assert_eq!(drain(&mut optimizer, |x| x).len(), 2);
    assert!(optimizer.next_config().unwrap().is_none());
    assert!(optimizer.next_config().unwrap().is_none());
    assert_eq!(optimizer.issued(), 2);
}

#[test]
fn count_mismatch_is_rejected() {
    let mut optimizer = Optimizer::from(GridSearch::new(vec![3, 3]));
    let err = optimizer
        .set_experiment(&experiment_x(Parameter::int("x", 0, 10)), Vec::new())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidGrid(_)));
}

#[test]
fn more_points_than_integers_is_rejected() {
    let mut optimizer = Optimizer::from(GridSearch::new(vec![5]));
    let err = optimizer
        .set_experiment(&experiment_x(Parameter::int("x", 0, 2)), Vec::new())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidGrid(_)));
}

#[test]
fn fractional_int_bounds_are_rejected_before_gridding() {
    let half = Parameter {
        name: "x".to_string(),
        kind: ParamType::Int,
        minimum: 0.5,
        maximum: 1.5,
    };
    let mut optimizer = Optimizer::from(GridSearch::new(vec![2]));
    let err = optimizer
        .set_experiment(&experiment_x(half), Vec::new())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidBounds { .. }));
}

#[test]
fn int_grid_points_are_distinct_after_casting() {
    for n in 1..=6 {
        let mut optimizer = Optimizer::from(GridSearch::new(vec![n]));
        optimizer
            .set_experiment(&experiment_x(Parameter::int("x", 0, 5)), Vec::new())
            .unwrap();
        let mut keys = HashSet::new();
        while let Some(configs) = optimizer.next_config().unwrap() {
            assert!(keys.insert(config_key(&configs)));
            optimizer
                .register(&paropt::Trial::new(0, 0, configs, 0.0))
                .unwrap();
        }
        assert_eq!(keys.len(), n);
    }
}

#[test]
fn grid_repeats_history_points() {
    let mut first = Optimizer::from(GridSearch::new(vec![3]));
    let exp = experiment_x(Parameter::int("x", 0, 10));
    first.set_experiment(&exp, Vec::new()).unwrap();
    let mut history = Vec::new();
    while let Some(configs) = first.next_config().unwrap() {
        history.push(paropt::Trial::new(0, 0, configs, 1.0));
    }

    let mut second = Optimizer::from(GridSearch::new(vec![3]));
    second.set_experiment(&exp, history).unwrap();
    second.warm_start().unwrap();
    assert_eq!(second.registered(), 3);
    assert_eq!(drain(&mut second, |_| 0.0).len(), 3);
}

fn grid_case() -> impl Strategy<Value = Vec<(i64, i64, usize, bool)>> {
    prop::collection::vec((-20i64..20, 3i64..30, 1usize..=4, any::<bool>()), 1..=3)
}

proptest! {
    #[test]
    fn grid_is_exhaustive_and_in_bounds(case in grid_case()) {
        let mut exp = paropt::Experiment::new("tool", "run");
        let mut counts = Vec::new();
        for (i, &(lo, span, k, is_int)) in case.iter().enumerate() {
            let name = format!("p{i}");
            let param = if is_int {
                Parameter::int(name, lo, lo + span)
            } else {
                Parameter::float(name, lo as f64, (lo + span) as f64)
            };
            exp = exp.parameter(param);
            counts.push(k);
        }

        let mut optimizer = Optimizer::from(GridSearch::new(counts.clone()));
        optimizer.set_experiment(&exp, Vec::new()).unwrap();

        let mut seen = HashSet::new();
        while let Some(configs) = optimizer.next_config().unwrap() {
            for c in &configs {
                let v = c.cast().as_f64();
                prop_assert!(v >= c.parameter.minimum && v <= c.parameter.maximum);
            }
            prop_assert!(seen.insert(config_key(&configs)));
        }

        prop_assert_eq!(seen.len(), counts.iter().product::<usize>());
        prop_assert!(optimizer.next_config().unwrap().is_none());
    }
}
