use paropt::Optimizer;
use paropt::optimizer::CoordinateSearch;
use paropt::parameter::Parameter;

use crate::{drain, experiment_x};

#[test]
fn climbs_towards_the_optimum() {
    let search = CoordinateSearch::builder().n_init(1).n_iter(40).seed(5).build();
    let mut optimizer = Optimizer::from(search);
    optimizer
        .set_experiment(&experiment_x(Parameter::float("x", 0.0, 10.0)), Vec::new())
        .unwrap();

    let xs = drain(&mut optimizer, |x| -(x - 7.0).powi(2));
    assert_eq!(xs.len(), 41);
    assert!(xs.iter().all(|x| (0.0..=10.0).contains(x)));

    let (_, best) = optimizer.get_max().unwrap();
    assert!(best > -1.0, "best outcome {best}");
}

#[test]
fn integer_moves_are_at_least_one() {
    let search = CoordinateSearch::builder().n_init(1).n_iter(4).seed(11).build();
    let mut optimizer = Optimizer::from(search);
    optimizer
        .set_experiment(&experiment_x(Parameter::int("x", 0, 100)), Vec::new())
        .unwrap();

    let xs = drain(&mut optimizer, |x| -x);
    assert_eq!(xs.len(), 5);
    assert!(xs.iter().all(|x| x.fract() == 0.0));
    assert_eq!(optimizer.name(), "coordinate");
}
