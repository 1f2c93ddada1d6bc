//! Read/write fit JSON files.
//!
//! Fit JSON is the portable record of one trial:
//! - trial id and physical parameters
//! - the front threshold and extracted front series
//! - the fitted `{psi, kappa, residual, converged}`
//!
//! Field names of the fit block are stable; downstream plotting reads them.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::pipeline::TrialReport;
use crate::domain::{FitResult, FrontSeries, TrialId, TrialParameters};
use crate::error::AppError;
use crate::fit::StopReason;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub trial: TrialId,
    pub params: TrialParameters,
    pub threshold: f64,
    pub fit: FitResult,
    pub stop: StopReason,
    pub front: FrontSeries,
}

impl FitFile {
    pub fn from_report(report: &TrialReport, threshold: f64) -> Self {
        Self {
            tool: "adsorb".to_string(),
            generated_at: Utc::now(),
            trial: report.trial.clone(),
            params: report.params.clone(),
            threshold,
            fit: report.result(),
            stop: report.search.stop,
            front: report.front.clone(),
        }
    }
}

/// Write a fit JSON file.
pub fn write_fit_json(path: &Path, report: &TrialReport, threshold: f64) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create fit JSON '{}': {e}", path.display())))?;

    serde_json::to_writer_pretty(file, &FitFile::from_report(report, threshold))
        .map_err(|e| AppError::new(2, format!("Failed to write fit JSON: {e}")))?;

    Ok(())
}

/// Read a fit JSON file.
pub fn read_fit_json(path: &Path) -> Result<FitFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open fit JSON '{}': {e}", path.display())))?;
    let fit: FitFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid fit JSON: {e}")))?;
    Ok(fit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::{TrialInput, run_trial};
    use crate::domain::{FitConfig, SaturationField};

    fn fitted_report(trial: &str) -> TrialReport {
        let rows: Vec<Vec<f64>> = (0..6)
            .map(|i| {
                let front = 0.1 + 0.16 * i as f64;
                (0..15)
                    .map(|j| ((front - j as f64 / 14.0) / 0.2 + 0.5).clamp(0.0, 1.0))
                    .collect()
            })
            .collect();
        let input = TrialInput {
            params: TrialParameters::dimensionless(0.2),
            field: SaturationField::from_rows(&rows).unwrap(),
        };
        let config = FitConfig {
            max_iters: 20,
            ..FitConfig::default()
        };
        run_trial(&TrialId::new(trial), &input, &config).unwrap()
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("adsorb-{}-{name}.json", std::process::id()))
    }

    #[test]
    fn written_file_reads_back() {
        let report = fitted_report("RB1");
        let path = temp_path("read-back");
        write_fit_json(&path, &report, 0.5).unwrap();
        let back = read_fit_json(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(back.tool, "adsorb");
        assert_eq!(back.trial, report.trial);
        assert_eq!(back.params, report.params);
        assert_eq!(back.threshold, 0.5);
        assert_eq!(back.fit, report.result());
        assert_eq!(back.stop, report.search.stop);
        assert_eq!(back.front, report.front);
    }

    #[test]
    fn infinite_residual_survives_the_file() {
        let mut report = fitted_report("RB2");
        report.search.result.residual = f64::INFINITY;
        report.search.result.converged = false;

        let path = temp_path("infinite");
        write_fit_json(&path, &report, 0.5).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let back = read_fit_json(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(text.contains(r#""residual": "inf""#));
        assert_eq!(back.fit.residual, f64::INFINITY);
        assert_eq!(back.fit, report.result());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = read_fit_json(&temp_path("does-not-exist")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn fit_block_uses_stable_field_names() {
        let file = FitFile {
            tool: "adsorb".to_string(),
            generated_at: Utc::now(),
            trial: TrialId::new("HFN2"),
            params: TrialParameters::dimensionless(0.1),
            threshold: 0.5,
            fit: FitResult {
                psi: 0.8,
                kappa: 3.5,
                residual: 0.01,
                converged: true,
            },
            stop: StopReason::Converged,
            front: FrontSeries {
                tau: vec![0.0, 0.1],
                z: vec![Some(0.1), None],
            },
        };

        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(value["trial"], "HFN2");
        assert_eq!(value["fit"]["psi"], 0.8);
        assert_eq!(value["fit"]["kappa"], 3.5);
        assert_eq!(value["fit"]["converged"], true);
        assert_eq!(value["stop"], "converged");
        assert!(value["front"]["z"][1].is_null());

        let back: FitFile = serde_json::from_value(value).unwrap();
        assert_eq!(back, file);
    }
}
