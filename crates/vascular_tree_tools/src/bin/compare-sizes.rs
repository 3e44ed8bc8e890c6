//! Compares where two particle size ranges come to rest along the same paths.
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use vascular_tree::prelude::*;
use vascular_tree_tools::{load_tree, run, ShapeArgs};

#[derive(Parser, Debug)]
#[command(name = "compare-sizes")]
#[command(about = "Mean distance between the stopping points of two particle sizes")]
struct Cli {
    /// Tree saved by grow-tree.
    #[arg(long)]
    tree: PathBuf,

    #[command(flatten)]
    shape: ShapeArgs,

    /// 5th and 95th percentile diameters of the first population in micrometres.
    #[arg(long, value_delimiter = ',', num_args = 2, default_values_t = [20.0, 30.0])]
    first_um: Vec<f64>,

    /// 5th and 95th percentile diameters of the second population in micrometres.
    #[arg(long, value_delimiter = ',', num_args = 2, default_values_t = [30.0, 40.0])]
    second_um: Vec<f64>,

    #[arg(long, default_value_t = 100_000)]
    trials: usize,

    #[arg(long, default_value_t = 0.6)]
    straight_ratio: f64,

    #[arg(short, long, default_value_t = 0)]
    seed: u64,
}

fn range(values: &[f64], flag: &str) -> anyhow::Result<Gaussian90> {
    let [min90, max90] = values[..] else {
        anyhow::bail!("{flag} takes exactly two values");
    };
    Ok(Gaussian90::new(um(min90), um(max90)))
}

fn main() -> ExitCode {
    run(|cli: Cli| {
        let tree = load_tree(&cli.tree, &cli.shape)?;
        let tracts = TractTree::new(tree.vessels())?;
        let config = CompareConfig::new(
            range(&cli.first_um, "--first-um")?,
            range(&cli.second_um, "--second-um")?,
        )
        .with_trials(cli.trials)
        .with_straight_ratio(cli.straight_ratio);

        let mut rng = StdRng::seed_from_u64(cli.seed);
        let r = compare_sizes(&tracts, &config, &mut rng)?;
        println!("first to end:  {:.3} mm", r.first_to_end * 1e3);
        println!("second to end: {:.3} mm", r.second_to_end * 1e3);
        println!("between:       {:.3} mm", r.between * 1e3);
        Ok(())
    })
}
