//! Scales terminal vessel radii of a grown tree towards a mean.
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use vascular_tree::stats::{DEFAULT_SPHERE_DIAMETER, DEFAULT_TERMINAL_RADIUS_GOAL};
use vascular_tree::prelude::*;
use vascular_tree_tools::{load_tree, run, write_ron, ShapeArgs};

#[derive(Parser, Debug)]
#[command(name = "adjust-terminals")]
#[command(about = "Scale terminal vessel radii of a grown tree to a mean")]
struct Cli {
    /// Tree saved by grow-tree.
    #[arg(long)]
    tree: PathBuf,

    #[command(flatten)]
    shape: ShapeArgs,

    /// Desired mean terminal radius in micrometres.
    #[arg(long, default_value_t = DEFAULT_TERMINAL_RADIUS_GOAL * 1e6)]
    goal_um: f64,

    #[arg(long, default_value_t = 1.0)]
    tolerance_um: f64,

    /// Where to save the scaled tree; nothing is written without it.
    #[arg(short, long)]
    out: Option<PathBuf>,
}

fn main() -> ExitCode {
    run(|cli: Cli| {
        let mut tree = load_tree(&cli.tree, &cli.shape)?;
        let passes = adjust_terminal_radii(tree.vessels_mut(), um(cli.goal_um), um(cli.tolerance_um))?;
        info!("{} scaling passes", passes);
        println!("{}", TreeStats::compute(&tree, DEFAULT_SPHERE_DIAMETER));
        if let Some(out) = &cli.out {
            write_ron(out, &tree.to_record())?;
        }
        Ok(())
    })
}
