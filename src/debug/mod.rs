//! Debug bundle writer for inspecting a trial's front series and kappa search.

use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::app::pipeline::TrialReport;
use crate::domain::FitConfig;
use crate::error::AppError;

/// Write `debug/adsorb_debug_<trial>_<timestamp>.md`.
pub fn write_debug_bundle(report: &TrialReport, config: &FitConfig) -> Result<PathBuf, AppError> {
    write_debug_bundle_in(Path::new("debug"), report, config)
}

pub fn write_debug_bundle_in(dir: &Path, report: &TrialReport, config: &FitConfig) -> Result<PathBuf, AppError> {
    create_dir_all(dir).map_err(|e| AppError::new(2, format!("Failed to create debug dir: {e}")))?;

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("adsorb_debug_{}_{ts}.md", report.trial));

    let mut file = File::create(&path).map_err(|e| AppError::new(2, format!("Failed to create debug file: {e}")))?;
    render(&mut file, report, config).map_err(|e| AppError::new(2, format!("Failed to write debug: {e}")))?;

    Ok(path)
}

fn render<W: Write>(out: &mut W, report: &TrialReport, config: &FitConfig) -> std::io::Result<()> {
    let fit = report.result();

    writeln!(out, "# adsorb debug bundle")?;
    writeln!(out, "- generated: {}", Local::now().to_rfc3339())?;
    writeln!(out, "- trial: {}", report.trial)?;
    writeln!(out, "- threshold: {}", config.threshold)?;
    writeln!(
        out,
        "- grid: nz={}, frames={}, frame_dtau={:.6e}, substeps={}, dtau={:.6e}, courant={:.4}",
        report.grid.nz,
        report.grid.n_frames,
        report.grid.frame_dtau,
        report.grid.substeps,
        report.grid.dtau(),
        report.grid.courant()
    )?;
    writeln!(
        out,
        "- search: guess={}, kappa_max={}, upper={:.6}, seeds={}, max_iters={}, metric={:?}",
        config.kappa_guess,
        config.kappa_max,
        report.search.kappa_upper,
        config.kappa_seed_points,
        config.max_iters,
        config.metric
    )?;
    writeln!(
        out,
        "- result: psi={:.8}, kappa={:.8}, residual={:.6e}, converged={}, stop={:?}",
        fit.psi, fit.kappa, fit.residual, fit.converged, report.search.stop
    )?;

    writeln!(out, "\n## Front series")?;
    writeln!(out, "| frame | tau | z |")?;
    writeln!(out, "| - | - | - |")?;
    for (i, (tau, z)) in report.front.tau.iter().zip(&report.front.z).enumerate() {
        match z {
            Some(z) => writeln!(out, "| {i} | {tau:.6} | {z:.6} |")?,
            None => writeln!(out, "| {i} | {tau:.6} | - |")?,
        }
    }

    writeln!(out, "\n## Kappa evaluations")?;
    writeln!(out, "| # | kappa | objective |")?;
    writeln!(out, "| - | - | - |")?;
    for (i, ev) in report.search.trace.iter().enumerate() {
        writeln!(out, "| {i} | {:.8} | {:.6e} |", ev.kappa, ev.objective)?;
    }

    Ok(())
}
