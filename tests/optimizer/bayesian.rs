use paropt::optimizer::{BayesianOptimizer, StopPolicy, Utility, UtilityKind};
use paropt::parameter::Parameter;
use paropt::{Experiment, Optimizer};

use crate::drain;

#[test]
fn defaults_are_two_and_two_with_ucb() {
    let optimizer = BayesianOptimizer::default();
    assert_eq!(optimizer.n_init(), 2);
    assert_eq!(optimizer.n_iter(), 2);
    assert_eq!(optimizer.utility().kind, UtilityKind::Ucb);
    assert!((optimizer.utility().kappa - 2.5).abs() < f64::EPSILON);
}

#[test]
fn suggests_n_init_plus_n_iter_in_bounds() {
    for utility in [Utility::ucb(1.0), Utility::ei(0.01), Utility::poi(0.01)] {
        let mut optimizer = Optimizer::from(
            BayesianOptimizer::builder()
                .n_init(3)
                .n_iter(5)
                .utility(utility)
                .n_candidates(200)
                .seed(21)
                .build(),
        );
        let exp = Experiment::new("tool", "run ${x}").parameter(Parameter::float("x", -5.0, 5.0));
        optimizer.set_experiment(&exp, Vec::new()).unwrap();

        let xs = drain(&mut optimizer, |x| -(x - 1.0).powi(2));
        assert_eq!(xs.len(), 8);
        assert!(xs.iter().all(|x| (-5.0..=5.0).contains(x)));
        assert_eq!(optimizer.name(), "bayesopt");
    }
}

#[test]
fn guided_phase_beats_a_poor_start() {
    let mut optimizer = Optimizer::from(
        BayesianOptimizer::builder()
            .n_init(4)
            .n_iter(12)
            .kappa(1.0)
            .seed(8)
            .policy(StopPolicy::default())
            .build(),
    );
    let exp = Experiment::new("tool", "run ${x}").parameter(Parameter::float("x", 0.0, 10.0));
    optimizer.set_experiment(&exp, Vec::new()).unwrap();
    drain(&mut optimizer, |x| -(x - 6.0).powi(2));

    let (_, best) = optimizer.get_max().unwrap();
    assert!(best > -4.0, "best outcome {best}");
}
