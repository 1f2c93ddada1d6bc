//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - installs the tracing subscriber
//! - reads saturation data and trial manifests
//! - runs the per-trial fit pipeline
//! - prints reports and writes optional exports

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::pipeline::{TrialFailure, TrialInput, TrialOutcome, TrialReport};
use crate::cli::{BatchArgs, Command, FitArgs, FitOptions, SimulateArgs};
use crate::data::{NoiseSpec, generate_field};
use crate::domain::{FitConfig, InitialCondition, InletBoundary, TrialId, TrialParameters};
use crate::error::AppError;
use crate::io::ingest::{LoadedField, load_manifest, load_saturation_csv};
use crate::models::SimulationGrid;

pub mod pipeline;

/// Ingest warnings listed in the terminal report.
const MAX_WARNING_ROWS: usize = 10;

/// Entry point for the `adsorb` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env is fine; flags and real env vars still apply.
    dotenvy::dotenv().ok();

    let cli = crate::cli::Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Batch(args) => handle_batch(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed (e.g. when embedded); keep it.
    let _ = if json { builder.json().try_init() } else { builder.try_init() };
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let mut config = fit_config_from_args(&args.opts)?;
    config.export_json = args.export_json.clone();
    config.export_front = args.export_front.clone();

    let (trial, params) = resolve_single_trial(&args)?;
    let loaded = load_field(&args.input, &config, &args.opts)?;
    let input = TrialInput {
        params,
        field: loaded.field.clone(),
    };

    info!(trial = %trial, frames = input.field.n_frames(), positions = input.field.n_positions(), "fitting trial");
    let report = pipeline::run_trial(&trial, &input, &config)?;

    let warnings = crate::report::format_ingest_warnings(&loaded, MAX_WARNING_ROWS);
    if !warnings.is_empty() {
        println!("{warnings}");
    }
    println!("{}", crate::report::format_trial_summary(&report, &config));

    // Optional exports.
    if let Some(path) = &config.export_results {
        crate::io::export::write_results_csv(path, &[Ok(report.clone())])?;
    }
    if let Some(path) = &config.export_json {
        crate::io::fit_json::write_fit_json(path, &report, config.threshold)?;
    }
    if let Some(path) = &config.export_front {
        crate::io::export::write_front_csv(path, &report.front)?;
    }
    if config.debug {
        let path = crate::debug::write_debug_bundle(&report, &config)?;
        info!(path = %path.display(), "debug bundle written");
    }

    Ok(())
}

fn handle_batch(args: BatchArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args.opts)?;
    let specs = load_manifest(&args.manifest, &args.data_dir)?;
    info!(trials = specs.len(), manifest = %args.manifest.display(), "manifest loaded");

    let mut trials: BTreeMap<TrialId, TrialInput> = BTreeMap::new();
    let mut load_failures: Vec<TrialFailure> = Vec::new();
    for spec in specs {
        match load_field(&spec.data_path, &config, &args.opts) {
            Ok(loaded) => {
                trials.insert(
                    spec.trial,
                    TrialInput {
                        params: spec.params,
                        field: loaded.field,
                    },
                );
            }
            Err(error) => {
                warn!(trial = %spec.trial, error = %error, "could not load trial data");
                load_failures.push(TrialFailure {
                    trial: spec.trial,
                    error,
                });
            }
        }
    }

    let mut outcomes = pipeline::run_batch(&trials, &config);
    outcomes.extend(load_failures.into_iter().map(Err));
    outcomes.sort_by(|a, b| outcome_trial(a).cmp(outcome_trial(b)));

    println!("{}", crate::report::format_batch_table(&outcomes));

    if let Some(path) = &config.export_results {
        crate::io::export::write_results_csv(path, &outcomes)?;
    }
    for report in outcomes.iter().filter_map(|o| o.as_ref().ok()) {
        export_batch_trial(report, &args, &config)?;
    }

    let failed = outcomes.iter().filter(|o| o.is_err()).count();
    if failed == outcomes.len() {
        let code = outcomes
            .first()
            .and_then(|o| o.as_ref().err())
            .map(|f| f.error.exit_code())
            .unwrap_or(3);
        return Err(AppError::new(code, format!("All {failed} trials failed.")));
    }
    Ok(())
}

fn export_batch_trial(report: &TrialReport, args: &BatchArgs, config: &FitConfig) -> Result<(), AppError> {
    if let Some(dir) = &args.export_json {
        ensure_dir(dir)?;
        let path = dir.join(format!("{}.json", report.trial));
        crate::io::fit_json::write_fit_json(&path, report, config.threshold)?;
    }
    if let Some(dir) = &args.export_front {
        ensure_dir(dir)?;
        let path = dir.join(format!("{}_front.csv", report.trial));
        crate::io::export::write_front_csv(&path, &report.front)?;
    }
    if config.debug {
        let path = crate::debug::write_debug_bundle(report, config)?;
        info!(trial = %report.trial, path = %path.display(), "debug bundle written");
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let grid = simulate_grid(&args)?;
    let noise = NoiseSpec {
        sd: args.noise_sd,
        nan_fraction: args.nan_fraction,
        seed: args.seed,
    };

    let synthetic = generate_field(
        &grid,
        args.kappa,
        args.psi,
        InitialCondition::clean_bed(),
        InletBoundary::default(),
        &noise,
    )?;
    crate::io::export::write_saturation_csv(&args.output, &synthetic.field)?;

    info!(
        path = %args.output.display(),
        nz = grid.nz,
        frames = grid.n_frames,
        substeps = grid.substeps,
        nan_cells = synthetic.nan_cells,
        "synthetic field written"
    );
    Ok(())
}

/// Grid for `adsorb simulate`; substeps default to the smallest stable count.
fn simulate_grid(args: &SimulateArgs) -> Result<SimulationGrid, AppError> {
    let substeps = match args.substeps {
        Some(substeps) => substeps,
        None => SimulationGrid::stable_substeps(args.nz, args.frame_dtau, args.kappa, args.psi)?,
    };
    Ok(SimulationGrid {
        nz: args.nz,
        n_frames: args.frames,
        frame_dtau: args.frame_dtau,
        substeps,
    })
}

/// Resolve the trial id and parameters for `adsorb fit`.
fn resolve_single_trial(args: &FitArgs) -> Result<(TrialId, TrialParameters), AppError> {
    if let Some(manifest) = &args.manifest {
        let wanted = args
            .trial
            .as_deref()
            .ok_or_else(|| AppError::new(2, "--manifest needs --trial."))?;
        let data_dir = args.input.parent().unwrap_or(Path::new("."));
        let spec = load_manifest(manifest, data_dir)?
            .into_iter()
            .find(|s| s.trial.as_str() == wanted)
            .ok_or_else(|| AppError::new(2, format!("Trial '{wanted}' not found in '{}'.", manifest.display())))?;
        return Ok((spec.trial, spec.params));
    }

    let frame_dtau = args
        .frame_dtau
        .ok_or_else(|| AppError::new(2, "Either --frame-dtau or --manifest is required."))?;
    let trial = args
        .trial
        .clone()
        .or_else(|| args.input.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "trial".to_string());
    Ok((TrialId::new(trial), TrialParameters::dimensionless(frame_dtau)))
}

fn load_field(path: &Path, config: &FitConfig, opts: &FitOptions) -> Result<LoadedField, AppError> {
    let loaded = load_saturation_csv(path, !opts.no_header)?;
    if !loaded.warnings.is_empty() {
        warn!(
            path = %path.display(),
            cells = loaded.warnings.len(),
            "unparseable cells replaced by NaN"
        );
    }
    if loaded.field.finite_count() == 0 {
        return Err(AppError::new(
            3,
            format!("{}: no finite saturation values (threshold {}).", path.display(), config.threshold),
        ));
    }
    Ok(loaded)
}

fn ensure_dir(dir: &Path) -> Result<(), AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::new(2, format!("Failed to create export dir '{}': {e}", dir.display())))
}

fn outcome_trial(outcome: &TrialOutcome) -> &TrialId {
    match outcome {
        Ok(report) => &report.trial,
        Err(failure) => &failure.trial,
    }
}

/// Resolve and validate the fit configuration.
pub fn fit_config_from_args(opts: &FitOptions) -> Result<FitConfig, AppError> {
    let time_budget = match opts.time_budget {
        Some(secs) => Some(
            Duration::try_from_secs_f64(secs)
                .map_err(|e| AppError::new(2, format!("Invalid --time-budget {secs}: {e}")))?,
        ),
        None => None,
    };

    let config = FitConfig {
        threshold: opts.threshold,
        kappa_guess: opts.kappa_guess,
        kappa_max: opts.kappa_max,
        kappa_seed_points: opts.kappa_seeds,
        max_iters: opts.max_iters,
        time_budget,
        x_abs_tol: opts.x_abs_tol,
        x_rel_tol: opts.x_rel_tol,
        metric: opts.metric,
        substeps: opts.substeps,
        initial: InitialCondition {
            gas: opts.initial_gas,
            solid: opts.initial_solid,
        },
        inlet: InletBoundary { gas: opts.inlet_gas },
        export_results: opts.export.clone(),
        export_json: None,
        export_front: None,
        debug: opts.debug,
    };
    config.validate()?;
    Ok(config)
}
