//! Distributes microspheres through a grown tree over several independent tries.
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::info;
use vascular_tree::prelude::*;
use vascular_tree_tools::{load_tree, run, write_ron, ShapeArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Unembolized,
    Embolized,
    Radiized,
    Unradiized,
    Concurrent,
}

#[derive(Parser, Debug)]
#[command(name = "distribute")]
#[command(about = "Distribute microspheres through a grown vascular tree")]
struct Cli {
    /// Tree saved by grow-tree.
    #[arg(long)]
    tree: PathBuf,

    #[command(flatten)]
    shape: ShapeArgs,

    #[arg(short, long, value_enum, default_value_t = ModeArg::Unembolized)]
    mode: ModeArg,

    /// Particles per try.
    #[arg(short = 'n', long, default_value_t = 1_000_000)]
    count: u64,

    #[arg(short, long, default_value_t = 1)]
    tries: usize,

    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    #[arg(long, default_value_t = 0.6)]
    straight_ratio: f64,

    #[arg(long, default_value_t = 50.0)]
    spheres_per_tract: f64,

    /// Fixed particle diameter in micrometres; overrides the Gaussian range.
    #[arg(long)]
    diameter_um: Option<f64>,

    /// 5th and 95th percentile diameters in micrometres.
    #[arg(long, value_delimiter = ',', num_args = 2, default_values_t = [20.0, 40.0])]
    range_um: Vec<f64>,

    /// Upper truncation of the Gaussian diameter in micrometres.
    #[arg(long)]
    max_um: Option<f64>,

    /// Injection duration in seconds for concurrent mode; 0 injects everything at once.
    #[arg(long, default_value_t = 10.0)]
    injection_s: f64,

    /// Output file.
    #[arg(short, long, default_value = "distribution.ron")]
    out: PathBuf,
}

impl Cli {
    fn sizes(&self) -> anyhow::Result<SphereSizes> {
        if let Some(d) = self.diameter_um {
            return Ok(SphereSizes::Fixed(um(d)));
        }
        let [min90, max90] = self.range_um[..] else {
            anyhow::bail!("--range-um takes exactly two values");
        };
        let mut g = Gaussian90::new(um(min90), um(max90));
        if let Some(max) = self.max_um {
            g = g.with_max(um(max));
        }
        Ok(SphereSizes::Gaussian90(g))
    }

    fn mode(&self) -> anyhow::Result<Mode> {
        Ok(match self.mode {
            ModeArg::Unembolized => Mode::Unembolized,
            ModeArg::Embolized => Mode::Embolized,
            ModeArg::Radiized => Mode::Radiized(self.sizes()?),
            ModeArg::Unradiized => Mode::Unradiized(self.sizes()?),
            ModeArg::Concurrent => {
                let injection = if self.injection_s > 0.0 {
                    Injection::Poisson {
                        duration: self.injection_s,
                    }
                } else {
                    Injection::Instant
                };
                Mode::Concurrent(
                    ConcurrentConfig::default()
                        .with_sizes(self.sizes()?)
                        .with_injection(injection),
                )
            }
        })
    }
}

fn main() -> ExitCode {
    run(|cli: Cli| {
        let tree = load_tree(&cli.tree, &cli.shape)?;
        let tracts = TractTree::new(tree.vessels())?;
        let config = DistributionConfig::default()
            .with_straight_ratio(cli.straight_ratio)
            .with_spheres_per_tract(cli.spheres_per_tract)
            .with_mode(cli.mode()?);
        let tries = TriesConfig::new(cli.tries)
            .with_seed(cli.seed)
            .with_poll_interval(Duration::from_secs(5));

        let results = run_tries(&tracts, cli.count, &config, &tries, |_| {})?;
        for (i, d) in results.iter().enumerate() {
            info!(
                "try {}: {} particles in {} clusters",
                i,
                d.spheres.len(),
                d.clusters.len()
            );
            for (size, n) in d.cluster_histogram() {
                println!("{i}\t{size}\t{n}");
            }
        }
        write_ron(&cli.out, &results)
    })
}
