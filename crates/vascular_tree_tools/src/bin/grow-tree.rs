//! Grows a macrocell tree from an initial trunk vessel list and saves it as RON.
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use vascular_tree::prelude::*;
use vascular_tree_tools::{run, write_ron, ShapeArgs};

#[derive(Parser, Debug)]
#[command(name = "grow-tree")]
#[command(about = "Grow a vascular tree by macrocell birth and death cycles")]
struct Cli {
    /// Initial trunk vessel list (13 whitespace separated columns, millimetres).
    #[arg(long)]
    trunk: PathBuf,

    /// Factor applied to trunk coordinates and radii.
    #[arg(long, default_value_t = DEFAULT_TRUNK_SCALE)]
    trunk_scale: f64,

    #[command(flatten)]
    shape: ShapeArgs,

    /// Number of growth cycles.
    #[arg(short, long, default_value_t = 10)]
    cycles: usize,

    /// Macrocell radius reached after the last cycle, in millimetres.
    #[arg(long, default_value_t = 0.6)]
    final_radius_mm: f64,

    /// Murray exponent.
    #[arg(long, default_value_t = 3.0)]
    gamma: f64,

    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Skip the grow-only fill of the initial tree.
    #[arg(long)]
    no_initial_fill: bool,

    /// Output file.
    #[arg(short, long, default_value = "tree.ron")]
    out: PathBuf,
}

fn main() -> ExitCode {
    run(|cli: Cli| {
        let trunk = read_initial_vessels(&cli.trunk, cli.trunk_scale)
            .with_context(|| format!("loading {}", cli.trunk.display()))?;
        let config = GrowthConfig::default()
            .with_gamma(cli.gamma)
            .with_seed(cli.seed)
            .with_initial_fill(!cli.no_initial_fill);

        let mut sink = FnSink::new(|event| match event {
            GrowthEvent::CycleFinished {
                cycle,
                change,
                macrocells,
                valid,
            } => info!(
                "cycle {} done: {} macrocells ({:+}), valid: {}",
                cycle, macrocells, change, valid
            ),
            GrowthEvent::Warning { context, message } => warn!("{}: {}", context, message),
            _ => {}
        });
        let mut tree = MacrocellTree::new_with_events(config, trunk, cli.shape.build()?, &mut sink)?;
        tree.build_with_events(cli.cycles, mm(cli.final_radius_mm), &mut sink)?;

        info!(
            "{} vessels, {} macrocells, {} centroid fallbacks",
            tree.vessels().len(),
            tree.cells().len(),
            tree.vessels().bifurcation_fallbacks()
        );
        write_ron(&cli.out, &tree.to_record())
    })
}
