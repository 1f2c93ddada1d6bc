//! Command-line parsing for the adsorption breakthrough fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code. Every numeric knob can also come from an
//! `ADSORB_*` environment variable (or a `.env` file).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::ResidualMetric;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "adsorb", version, about = "Adsorption breakthrough front + mass-transfer fitter")]
pub struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true, env = "ADSORB_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit psi and kappa for a single saturation CSV.
    Fit(FitArgs),
    /// Fit every trial listed in a manifest.
    Batch(BatchArgs),
    /// Write a synthetic saturation CSV from the transport model.
    Simulate(SimulateArgs),
}

/// Options for a single-trial fit.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Saturation CSV (rows = frames, columns = spatial bins, inlet first).
    #[arg(long, value_name = "CSV")]
    pub input: PathBuf,

    /// Dimensionless time between frames.
    #[arg(long, env = "ADSORB_FRAME_DTAU", required_unless_present = "manifest")]
    pub frame_dtau: Option<f64>,

    /// Take trial parameters from this manifest instead of `--frame-dtau`.
    #[arg(long, value_name = "CSV", requires = "trial")]
    pub manifest: Option<PathBuf>,

    /// Trial id to look up in the manifest.
    #[arg(long)]
    pub trial: Option<String>,

    /// Export the fit (parameters, front, result) to JSON.
    #[arg(long = "export-json")]
    pub export_json: Option<PathBuf>,

    /// Export the front series to CSV.
    #[arg(long = "export-front")]
    pub export_front: Option<PathBuf>,

    #[command(flatten)]
    pub opts: FitOptions,
}

/// Options for a manifest-driven batch.
#[derive(Debug, Args, Clone)]
pub struct BatchArgs {
    /// Trial manifest CSV.
    #[arg(long, value_name = "CSV", env = "ADSORB_MANIFEST")]
    pub manifest: PathBuf,

    /// Directory holding `<trial>.csv` saturation files.
    #[arg(long, value_name = "DIR", env = "ADSORB_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Write `<trial>.json` fit files into this directory.
    #[arg(long = "export-json", value_name = "DIR")]
    pub export_json: Option<PathBuf>,

    /// Write `<trial>_front.csv` files into this directory.
    #[arg(long = "export-front", value_name = "DIR")]
    pub export_front: Option<PathBuf>,

    #[command(flatten)]
    pub opts: FitOptions,
}

/// Fit knobs shared by `fit` and `batch`.
#[derive(Debug, Args, Clone)]
pub struct FitOptions {
    /// Saturation threshold defining the front.
    #[arg(long, env = "ADSORB_THRESHOLD", default_value_t = 0.5)]
    pub threshold: f64,

    /// Initial kappa guess (centre of the seed scan).
    #[arg(long, env = "ADSORB_KAPPA_GUESS", default_value_t = 1.0)]
    pub kappa_guess: f64,

    /// Largest kappa the search may try.
    #[arg(long, env = "ADSORB_KAPPA_MAX", default_value_t = 200.0)]
    pub kappa_max: f64,

    /// Seed scan points.
    #[arg(long, env = "ADSORB_KAPPA_SEEDS", default_value_t = 25)]
    pub kappa_seeds: usize,

    /// Golden-section iteration budget.
    #[arg(long, env = "ADSORB_MAX_ITERS", default_value_t = 100)]
    pub max_iters: usize,

    /// Wall-clock budget per trial, in seconds.
    #[arg(long, env = "ADSORB_TIME_BUDGET")]
    pub time_budget: Option<f64>,

    /// Absolute kappa tolerance.
    #[arg(long, env = "ADSORB_X_ABS_TOL", default_value_t = 1e-9)]
    pub x_abs_tol: f64,

    /// Relative kappa tolerance.
    #[arg(long, env = "ADSORB_X_REL_TOL", default_value_t = 1e-7)]
    pub x_rel_tol: f64,

    /// Residual metric.
    #[arg(long, value_enum, env = "ADSORB_METRIC", default_value_t = ResidualMetric::Sse)]
    pub metric: ResidualMetric,

    /// Solver steps per frame (default: smallest stable count for `--kappa-max`).
    #[arg(long, env = "ADSORB_SUBSTEPS")]
    pub substeps: Option<usize>,

    /// Initial gas saturation in the bed.
    #[arg(long, default_value_t = 0.0)]
    pub initial_gas: f64,

    /// Initial solid saturation in the bed.
    #[arg(long, default_value_t = 0.0)]
    pub initial_solid: f64,

    /// Gas saturation held at the inlet.
    #[arg(long, default_value_t = 1.0)]
    pub inlet_gas: f64,

    /// Saturation CSVs have no header line.
    #[arg(long)]
    pub no_header: bool,

    /// Export per-trial results to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Write a markdown debug bundle per trial under `debug/`.
    #[arg(long, env = "ADSORB_DEBUG")]
    pub debug: bool,
}

/// Options for synthetic data generation.
#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Output saturation CSV.
    #[arg(long, value_name = "CSV")]
    pub output: PathBuf,

    /// Spatial bins.
    #[arg(long, default_value_t = 50)]
    pub nz: usize,

    /// Time frames.
    #[arg(long, default_value_t = 40)]
    pub frames: usize,

    /// Dimensionless time between frames.
    #[arg(long, default_value_t = 0.05)]
    pub frame_dtau: f64,

    /// Solver steps per frame (default: smallest stable count).
    #[arg(long)]
    pub substeps: Option<usize>,

    #[arg(long)]
    pub kappa: f64,

    #[arg(long)]
    pub psi: f64,

    /// Gaussian noise standard deviation added to the solid phase.
    #[arg(long, default_value_t = 0.0)]
    pub noise_sd: f64,

    /// Fraction of cells replaced by NaN.
    #[arg(long, default_value_t = 0.0)]
    pub nan_fraction: f64,

    /// Random seed for noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}
