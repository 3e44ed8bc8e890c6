#![forbid(unsafe_code)]
//! Shared plumbing for the vascular_tree command-line tools.
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{Args, Parser, ValueEnum};
use glam::DVec3;
use ron::ser::PrettyConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use vascular_tree::prelude::*;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Fails only when a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Parses `C` from the command line and runs `body`.
///
/// Help and version requests exit with 0, parse failures and errors with 1.
pub fn run<C, F>(body: F) -> ExitCode
where
    C: Parser,
    F: FnOnce(C) -> anyhow::Result<()>,
{
    run_from(std::env::args_os(), body)
}

/// [`run`] over an explicit argument list.
pub fn run_from<C, F, I, T>(args: I, body: F) -> ExitCode
where
    C: Parser,
    F: FnOnce(C) -> anyhow::Result<()>,
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match C::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            if e.print().is_err() {
                return ExitCode::FAILURE;
            }
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };
    init_tracing();
    match body(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShapeKind {
    Box,
    Ellipsoid,
}

/// Organ shape options shared by every tool.
#[derive(Debug, Clone, Args)]
pub struct ShapeArgs {
    /// Analytic organ shape.
    #[arg(long, value_enum, default_value_t = ShapeKind::Ellipsoid)]
    pub shape: ShapeKind,

    /// Size of the shape's bounding box in millimetres; the box starts at the origin.
    #[arg(long, value_delimiter = ',', num_args = 3, default_values_t = [160.0, 120.0, 100.0])]
    pub size_mm: Vec<f64>,
}

impl ShapeArgs {
    pub fn build(&self) -> anyhow::Result<Arc<dyn Shape>> {
        let [x, y, z] = self.size_mm[..] else {
            anyhow::bail!("--size-mm takes exactly three values");
        };
        let size = DVec3::new(mm(x), mm(y), mm(z));
        anyhow::ensure!(size.min_element() > 0.0, "--size-mm values must be positive");
        Ok(match self.shape {
            ShapeKind::Box => Arc::new(BoxShape::new(DVec3::ZERO, size)),
            ShapeKind::Ellipsoid => Arc::new(EllipsoidShape::new(size / 2.0, size / 2.0)),
        })
    }
}

pub fn read_ron<T: DeserializeOwned>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    ron::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn write_ron<T: Serialize>(path: impl AsRef<Path>, value: &T) -> anyhow::Result<()> {
    let path = path.as_ref();
    let text = ron::ser::to_string_pretty(value, PrettyConfig::default())
        .with_context(|| format!("serializing {}", path.display()))?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

/// Loads a grown tree saved by `grow-tree`.
pub fn load_tree(path: impl AsRef<Path>, shape: &ShapeArgs) -> anyhow::Result<MacrocellTree> {
    let record: TreeRecord = read_ron(path.as_ref())?;
    MacrocellTree::from_record(&record, shape.build()?)
        .with_context(|| format!("restoring {}", path.as_ref().display()))
}
