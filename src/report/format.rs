//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized

use crate::app::pipeline::{TrialOutcome, TrialReport};
use crate::domain::FitConfig;
use crate::io::ingest::LoadedField;

/// Full summary of one fitted trial.
pub fn format_trial_summary(report: &TrialReport, config: &FitConfig) -> String {
    let mut out = String::new();
    let fit = report.result();

    out.push_str("=== adsorb - breakthrough fit ===\n");
    out.push_str(&format!("Trial: {}\n", report.trial));
    out.push_str(&format!(
        "Bed: height={} | diameter={} | volume={} | porosity={:.3} | flow={}\n",
        report.params.bed_height,
        report.params.bed_diameter,
        report.params.bed_volume,
        report.params.porosity,
        report.params.flow_rate,
    ));
    out.push_str(&format!(
        "Grid: nz={} | frames={} | frame_dtau={:.4e} | substeps={} | tau_max={:.4}\n",
        report.grid.nz,
        report.grid.n_frames,
        report.grid.frame_dtau,
        report.grid.substeps,
        report.grid.tau_max(),
    ));
    out.push_str(&format!(
        "Front: threshold={:.3} | frames={} | missing={}\n",
        config.threshold,
        report.front.len(),
        report.missing_fronts(),
    ));

    out.push_str("\nFit:\n");
    out.push_str(&format!("  psi      = {:.6}\n", fit.psi));
    out.push_str(&format!("  kappa    = {:.6}  (search range 0..{:.4})\n", fit.kappa, report.search.kappa_upper));
    out.push_str(&format!("  residual = {:.6e}  ({:?})\n", fit.residual, config.metric));
    out.push_str(&format!(
        "  converged = {}  (stop: {:?}, {} golden iterations, {} evaluations)\n",
        fit.converged,
        report.search.stop,
        report.search.iterations,
        report.search.trace.len(),
    ));

    out
}

/// One line per trial, failures included.
pub fn format_batch_table(outcomes: &[TrialOutcome]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<12} {:>12} {:>12} {:>12} {:>9} {:>8}\n",
        "trial", "psi", "kappa", "residual", "converged", "missing"
    ));

    for outcome in outcomes {
        match outcome {
            Ok(report) => {
                let fit = report.result();
                out.push_str(&format!(
                    "{:<12} {:>12.6} {:>12.6} {:>12.4e} {:>9} {:>8}\n",
                    truncate(report.trial.as_str(), 12),
                    fit.psi,
                    fit.kappa,
                    fit.residual,
                    fit.converged,
                    report.missing_fronts(),
                ));
            }
            Err(failure) => {
                out.push_str(&format!(
                    "{:<12} FAILED (exit {}): {}\n",
                    truncate(failure.trial.as_str(), 12),
                    failure.error.exit_code(),
                    failure.error.message(),
                ));
            }
        }
    }

    let failed = outcomes.iter().filter(|o| o.is_err()).count();
    out.push_str(&format!("\n{} trials, {} failed\n", outcomes.len(), failed));
    out
}

/// Ingest warnings worth showing to a user, capped at `max_rows` entries.
pub fn format_ingest_warnings(loaded: &LoadedField, max_rows: usize) -> String {
    let mut out = String::new();
    if loaded.warnings.is_empty() {
        return out;
    }

    out.push_str(&format!(
        "Ingest: {} unparseable cells replaced by NaN ({} empty/NaN cells)\n",
        loaded.warnings.len(),
        loaded.missing_cells
    ));
    for w in loaded.warnings.iter().take(max_rows) {
        out.push_str(&format!("  line {} col {}: '{}'\n", w.line, w.column, truncate(&w.raw, 24)));
    }
    if loaded.warnings.len() > max_rows {
        out.push_str(&format!("  ... {} more\n", loaded.warnings.len() - max_rows));
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(max.saturating_sub(1)).collect();
        t.push('…');
        t
    }
}
