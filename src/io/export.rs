//! Export trial results and front series to CSV.
//!
//! The exports are meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::app::pipeline::TrialOutcome;
use crate::domain::{FrontSeries, SaturationField};
use crate::error::AppError;

/// Write one row per trial to a CSV file.
pub fn write_results_csv(path: &Path, outcomes: &[TrialOutcome]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    write_results(file, outcomes)
}

/// Results table; failed trials keep their row with the error text.
pub fn write_results<W: Write>(mut out: W, outcomes: &[TrialOutcome]) -> Result<(), AppError> {
    writeln!(out, "trial,psi,kappa,residual,converged,stop,frames,missing_fronts,substeps,error")
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV header: {e}")))?;

    for outcome in outcomes {
        let written = match outcome {
            Ok(report) => {
                let fit = report.result();
                writeln!(
                    out,
                    "{},{:.10},{:.10},{:.10e},{},{:?},{},{},{},",
                    report.trial,
                    fit.psi,
                    fit.kappa,
                    fit.residual,
                    fit.converged,
                    report.search.stop,
                    report.front.len(),
                    report.missing_fronts(),
                    report.grid.substeps,
                )
            }
            Err(failure) => writeln!(
                out,
                "{},,,,,,,,,{}",
                failure.trial,
                csv_quote(failure.error.message())
            ),
        };
        written.map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }

    Ok(())
}

/// Write a front series as `tau,z` rows; missing fronts leave `z` empty.
pub fn write_front_csv(path: &Path, front: &FrontSeries) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create front CSV '{}': {e}", path.display())))?;

    writeln!(file, "tau,z").map_err(|e| AppError::new(2, format!("Failed to write front CSV header: {e}")))?;
    for (tau, z) in front.tau.iter().zip(&front.z) {
        let z = z.map(|v| format!("{v:.10}")).unwrap_or_default();
        writeln!(file, "{tau:.10},{z}").map_err(|e| AppError::new(2, format!("Failed to write front CSV row: {e}")))?;
    }
    Ok(())
}

/// Write a saturation field in the layout `io::ingest` reads back.
pub fn write_saturation_csv(path: &Path, field: &SaturationField) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create saturation CSV '{}': {e}", path.display())))?;
    write_saturation(file, field)
}

pub fn write_saturation<W: Write>(mut out: W, field: &SaturationField) -> Result<(), AppError> {
    let header: Vec<String> = (0..field.n_positions()).map(|j| format!("z{j}")).collect();
    writeln!(out, "{}", header.join(","))
        .map_err(|e| AppError::new(2, format!("Failed to write saturation CSV header: {e}")))?;

    for i in 0..field.n_frames() {
        let row: Vec<String> = field
            .frame(i)
            .map(|v| if v.is_finite() { format!("{v:.10}") } else { "nan".to_string() })
            .collect();
        writeln!(out, "{}", row.join(","))
            .map_err(|e| AppError::new(2, format!("Failed to write saturation CSV row: {e}")))?;
    }
    Ok(())
}

fn csv_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}
