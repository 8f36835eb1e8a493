//! Shell objective: tune the parameters of a command that prints a score.
//!
//! The command is a `bash` one-liner that prints `-(x - 7)^2 - (y - 3)^2`.
//! A grid pass maps the space, then a Bayesian session on the same storage
//! warm-starts from the grid's trials and refines around the best point.
//!
//! Run with: `cargo run --example shell_search`

use paropt::prelude::*;

fn main() -> paropt::Result<()> {
    let experiment = Experiment::new(
        "paraboloid",
        "echo $(( -(${x} - 7) * (${x} - 7) - (${y} - 3) * (${y} - 3) ))",
    )
    .parameter(Parameter::int("x", 0, 12))
    .parameter(Parameter::int("y", 0, 6));

    let storage = MemoryStorage::new();
    let logs_root = std::env::temp_dir().join(format!("paropt-demo-{}", std::process::id()));

    let mut grid = Runner::builder(
        experiment.clone(),
        GridSearch::new(vec![4, 3]),
        storage.clone(),
        ShellObjective::new(Scoring::SearchMatrix),
    )
    .logs_root(&logs_root)
    .warmup(false)
    .build()?;
    let result = grid.run();
    println!(
        "grid: {} trials, success={}, best={:?}",
        result.message.len(),
        result.success,
        grid.get_max().map(|(_, v)| v),
    );
    grid.cleanup();

    let bayes = BayesianOptimizer::builder()
        .n_init(2)
        .n_iter(8)
        .utility(Utility::ei(0.01))
        .seed(7)
        .build();
    let mut refine = Runner::builder(
        experiment,
        bayes,
        storage,
        ShellObjective::new(Scoring::SearchMatrix),
    )
    .logs_root(&logs_root)
    .warmup(false)
    .build()?;
    let result = refine.run();
    println!(
        "bayesian run {}: {} trials, stop={:?}",
        refine.run_number(),
        result.message.len(),
        result.stop_reason,
    );

    if let Some((best, outcome)) = refine.get_max() {
        let values: Vec<String> = best
            .iter()
            .map(|c| format!("{}={}", c.name(), c.cast()))
            .collect();
        println!("best: {} -> {outcome}", values.join(", "));
    }
    println!("logs: {}", refine.log_path().display());
    refine.cleanup();
    Ok(())
}
