//! CSV ingest.
//!
//! Two inputs:
//!
//! - a **saturation matrix** per trial: one row per time frame, one column per
//!   spatial bin (inlet first), optional header line
//! - a **trial manifest**: one row per trial with its physical parameters
//!
//! Design goals:
//! - **Strict shape** for the matrix (ragged rows are an input error, exit code 2)
//! - **Cell-level tolerance** (unparseable cells become NaN, but are reported)
//! - **Separation of concerns**: no fitting logic here

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::{SaturationField, TrialId, TrialParameters};
use crate::error::AppError;

/// A cell that could not be parsed and was replaced by NaN.
#[derive(Debug, Clone)]
pub struct CellWarning {
    pub line: usize,
    pub column: usize,
    pub raw: String,
}

/// Ingest output: the field plus what had to be patched on the way in.
#[derive(Debug, Clone)]
pub struct LoadedField {
    pub field: SaturationField,
    pub warnings: Vec<CellWarning>,
    /// Cells that were empty or an explicit NaN marker.
    pub missing_cells: usize,
}

/// Load a saturation matrix from a CSV file.
pub fn load_saturation_csv(path: &Path, has_headers: bool) -> Result<LoadedField, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open saturation CSV '{}': {e}", path.display())))?;
    read_saturation_csv(file, has_headers)
        .map_err(|e| AppError::new(e.exit_code(), format!("{}: {e}", path.display())))
}

/// Read a saturation matrix from any CSV source.
pub fn read_saturation_csv<R: Read>(reader: R, has_headers: bool) -> Result<LoadedField, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut warnings = Vec::new();
    let mut missing_cells = 0usize;
    let mut width: Option<usize> = None;

    for (idx, result) in reader.records().enumerate() {
        // 1-based line numbers, plus one for the header line if present.
        let line = idx + 1 + usize::from(has_headers);
        let record = result.map_err(|e| AppError::new(2, format!("CSV parse error on line {line}: {e}")))?;

        match width {
            None => width = Some(record.len()),
            Some(w) if w != record.len() => {
                return Err(AppError::new(
                    2,
                    format!("Ragged saturation matrix: line {line} has {} columns, expected {w}.", record.len()),
                ));
            }
            Some(_) => {}
        }

        let mut row = Vec::with_capacity(record.len());
        for (column, raw) in record.iter().enumerate() {
            match parse_cell(raw) {
                Cell::Value(v) => row.push(v),
                Cell::Missing => {
                    missing_cells += 1;
                    row.push(f64::NAN);
                }
                Cell::Invalid => {
                    warnings.push(CellWarning {
                        line,
                        column: column + 1,
                        raw: raw.to_string(),
                    });
                    row.push(f64::NAN);
                }
            }
        }
        rows.push(row);
    }

    let field = SaturationField::from_rows(&rows)
        .ok_or_else(|| AppError::new(3, "Saturation matrix has no data rows."))?;

    Ok(LoadedField {
        field,
        warnings,
        missing_cells,
    })
}

enum Cell {
    Value(f64),
    Missing,
    Invalid,
}

fn parse_cell(raw: &str) -> Cell {
    let s = raw.trim();
    if s.is_empty() || matches!(s.to_ascii_lowercase().as_str(), "nan" | "na" | "n/a" | "null") {
        return Cell::Missing;
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Cell::Value(v),
        _ => Cell::Invalid,
    }
}

/// One manifest row as it appears in the CSV.
#[derive(Debug, Clone, Deserialize)]
struct ManifestRow {
    trial: String,
    bed_height: f64,
    bed_volume: f64,
    bed_diameter: f64,
    flow_rate: f64,
    porosity: f64,
    frame_interval: f64,
    tau_scale: f64,
}

/// A trial listed in the manifest, with where to find its saturation data.
#[derive(Debug, Clone)]
pub struct TrialSpec {
    pub trial: TrialId,
    pub params: TrialParameters,
    pub data_path: PathBuf,
}

/// Load the trial manifest; each trial's data is `<data_dir>/<trial>.csv`.
pub fn load_manifest(path: &Path, data_dir: &Path) -> Result<Vec<TrialSpec>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open manifest '{}': {e}", path.display())))?;
    read_manifest(file, data_dir)
}

pub fn read_manifest<R: Read>(reader: R, data_dir: &Path) -> Result<Vec<TrialSpec>, AppError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut specs: Vec<TrialSpec> = Vec::new();
    for (idx, result) in reader.deserialize::<ManifestRow>().enumerate() {
        let line = idx + 2;
        let row = result.map_err(|e| AppError::new(2, format!("Manifest line {line}: {e}")))?;
        if row.trial.is_empty() {
            return Err(AppError::new(2, format!("Manifest line {line}: empty trial id.")));
        }
        if specs.iter().any(|s| s.trial.as_str() == row.trial) {
            return Err(AppError::new(2, format!("Manifest line {line}: duplicate trial '{}'.", row.trial)));
        }

        let data_path = data_dir.join(format!("{}.csv", row.trial));
        specs.push(TrialSpec {
            trial: TrialId::new(row.trial),
            params: TrialParameters {
                bed_height: row.bed_height,
                bed_volume: row.bed_volume,
                bed_diameter: row.bed_diameter,
                flow_rate: row.flow_rate,
                porosity: row.porosity,
                frame_interval: row.frame_interval,
                tau_scale: row.tau_scale,
            },
            data_path,
        });
    }

    if specs.is_empty() {
        return Err(AppError::new(3, "Manifest lists no trials."));
    }
    Ok(specs)
}
