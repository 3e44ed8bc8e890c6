//! Prints summary statistics of grown trees.
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use vascular_tree::stats::DEFAULT_SPHERE_DIAMETER;
use vascular_tree::prelude::*;
use vascular_tree_tools::{load_tree, run, write_ron, ShapeArgs};

#[derive(Parser, Debug)]
#[command(name = "tree-stats")]
#[command(about = "Summary statistics of grown vascular trees")]
struct Cli {
    /// Trees saved by grow-tree.
    #[arg(required = true)]
    trees: Vec<PathBuf>,

    #[command(flatten)]
    shape: ShapeArgs,

    /// Reference particle diameter in micrometres.
    #[arg(long, default_value_t = DEFAULT_SPHERE_DIAMETER * 1e6)]
    sphere_um: f64,

    /// Also write the statistics next to each tree as `<tree>.stats.ron`.
    #[arg(long)]
    save: bool,
}

fn main() -> ExitCode {
    run(|cli: Cli| {
        for path in &cli.trees {
            let tree = load_tree(path, &cli.shape)?;
            let stats = TreeStats::compute(&tree, um(cli.sphere_um));
            println!("Tree at {}", path.display());
            println!("{stats}");
            if cli.save {
                write_ron(path.with_extension("stats.ron"), &stats)?;
            }
        }
        Ok(())
    })
}
