use paropt::optimizer::{RandomSearch, StopPolicy, StopReason};
use paropt::parameter::Parameter;
use paropt::{Optimizer, Trial};

use crate::experiment_x;

const DAY: f64 = 86_400.0;

fn random(policy: StopPolicy) -> Optimizer {
    let mut optimizer = Optimizer::from(
        RandomSearch::builder()
            .n_iter(100)
            .seed(3)
            .policy(policy)
            .build(),
    );
    optimizer
        .set_experiment(&experiment_x(Parameter::float("x", 0.0, 1.0)), Vec::new())
        .unwrap();
    optimizer
}

/// Registers `outcomes` one suggestion at a time and returns how many ran.
fn feed(optimizer: &mut Optimizer, outcomes: &[f64]) -> usize {
    let mut ran = 0;
    for &outcome in outcomes {
        let Some(configs) = optimizer.next_config().unwrap() else {
            break;
        };
        optimizer.register(&Trial::new(0, 0, configs, outcome)).unwrap();
        ran += 1;
    }
    ran
}

#[test]
fn budget_stops_after_the_trial_that_depletes_it() {
    let mut optimizer = random(StopPolicy::default().budget(10.0));
    let ran = feed(&mut optimizer, &[-3.0 / DAY; 10]);
    assert_eq!(ran, 4);
    assert_eq!(optimizer.stop_reason(), Some(StopReason::Budget));
    assert!(optimizer.next_config().unwrap().is_none());
}

#[test]
fn history_does_not_consume_budget() {
    let exp = experiment_x(Parameter::float("x", 0.0, 1.0));
    let history: Vec<Trial> = (0..5)
        .map(|i| {
            let configs = exp.search_space().unwrap().to_configs(&[f64::from(i) / 10.0]);
            Trial::new(0, 0, configs, -100.0 / DAY)
        })
        .collect();

    let mut optimizer = Optimizer::from(
        RandomSearch::builder()
            .n_iter(10)
            .seed(9)
            .policy(StopPolicy::default().budget(5.0))
            .build(),
    );
    optimizer.set_experiment(&exp, history).unwrap();
    optimizer.warm_start().unwrap();
    assert_eq!(optimizer.stop_reason(), None);
    assert_eq!(feed(&mut optimizer, &[-2.0 / DAY; 10]), 3);
}

#[test]
fn convergence_stops_after_stale_steps() {
    let mut optimizer = random(StopPolicy::default().convergence(0.05, 2));
    let ran = feed(&mut optimizer, &[-1.0, -0.5, -0.5, -0.49, -0.1, -0.1]);
    assert_eq!(ran, 4);
    assert_eq!(optimizer.stop_reason(), Some(StopReason::Converged));
}

#[test]
fn improvement_resets_the_stale_counter() {
    let mut optimizer = random(StopPolicy::default().convergence(0.05, 2));
    let ran = feed(&mut optimizer, &[-1.0, -1.0, -0.5, -0.5, -0.2, -0.1, -0.1, -0.1]);
    // stale counter after each trial: -, 1, 0, 1, 0, 0, 1, 2
    assert_eq!(ran, 8);
    assert_eq!(optimizer.stop_reason(), Some(StopReason::Converged));
}

#[test]
fn failures_skip_budget_and_convergence() {
    let mut optimizer = random(StopPolicy::default().budget(1.0).convergence(0.05, 1));
    for _ in 0..5 {
        let configs = optimizer.next_config().unwrap().unwrap();
        optimizer
            .register_failure(&Trial::new(0, 0, configs, paropt::trial::FAILED_TRIAL_OUTCOME))
            .unwrap();
    }
    assert_eq!(optimizer.stop_reason(), None);
    assert_eq!(optimizer.registered(), 5);
}
