//! Per-trial fit pipeline and the batch runner.
//!
//! One trial goes:
//! saturation field -> front series -> psi (slope) -> simulation grid -> kappa fit
//!
//! Trials share nothing but the read-only [`FitConfig`], so the batch runs them
//! in parallel and reports each outcome under its own trial id.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::{FitConfig, FitResult, FrontSeries, SaturationField, TrialId, TrialParameters};
use crate::error::{AppError, CoreError};
use crate::fit::{KappaFitOptions, KappaSearch, fit_front_slope, fit_kappa_traced};
use crate::front::extract_front;
use crate::models::SimulationGrid;

/// Everything needed to fit one trial.
#[derive(Debug, Clone)]
pub struct TrialInput {
    pub params: TrialParameters,
    pub field: SaturationField,
}

/// A fitted trial with the intermediate results worth reporting.
#[derive(Debug, Clone)]
pub struct TrialReport {
    pub trial: TrialId,
    pub params: TrialParameters,
    pub front: FrontSeries,
    pub grid: SimulationGrid,
    pub search: KappaSearch,
}

impl TrialReport {
    pub fn result(&self) -> FitResult {
        self.search.result
    }

    /// Frames where no front crossing was found.
    pub fn missing_fronts(&self) -> usize {
        self.front.missing_count()
    }
}

/// A trial that could not be fitted.
#[derive(Debug, Clone)]
pub struct TrialFailure {
    pub trial: TrialId,
    pub error: AppError,
}

pub type TrialOutcome = Result<TrialReport, TrialFailure>;

/// Fit psi and kappa for a single trial.
pub fn run_trial(trial: &TrialId, input: &TrialInput, config: &FitConfig) -> Result<TrialReport, CoreError> {
    input.params.validate()?;
    let field = &input.field;
    let frame_dtau = input.params.frame_dtau();

    let tau = input.params.tau_axis(field.n_frames());
    let front = extract_front(field, &tau, config.threshold);
    let missing = front.missing_count();
    if missing > 0 {
        warn!(trial = %trial, missing, frames = front.len(), "frames without a front crossing");
    }

    let psi = fit_front_slope(&front)?;
    if !(psi.is_finite() && psi >= 0.0) {
        warn!(trial = %trial, psi, "front slope is negative or non-finite");
        return Err(CoreError::invalid("psi", psi, "front must advance downstream"));
    }
    info!(trial = %trial, psi, pairs = front.len() - missing, "front slope fitted");

    let substeps = match config.substeps {
        Some(substeps) => substeps,
        None => SimulationGrid::stable_substeps(field.n_positions(), frame_dtau, config.kappa_max, psi)?,
    };
    let grid = SimulationGrid::aligned_with(field, frame_dtau, substeps);

    let opts = KappaFitOptions::from(config);
    let search = fit_kappa_traced(field, &grid, psi, config.kappa_guess, &opts)?;

    if search.result.converged {
        info!(
            trial = %trial,
            kappa = search.result.kappa,
            residual = search.result.residual,
            iterations = search.iterations,
            "kappa fit converged"
        );
    } else {
        warn!(
            trial = %trial,
            kappa = search.result.kappa,
            stop = ?search.stop,
            iterations = search.iterations,
            "kappa fit did not converge; keeping best estimate"
        );
    }

    Ok(TrialReport {
        trial: trial.clone(),
        params: input.params.clone(),
        front,
        grid,
        search,
    })
}

/// Fit every trial in parallel; outcomes come back ordered by trial id.
pub fn run_batch(trials: &BTreeMap<TrialId, TrialInput>, config: &FitConfig) -> Vec<TrialOutcome> {
    info!(trials = trials.len(), "batch started");

    let entries: Vec<(&TrialId, &TrialInput)> = trials.iter().collect();
    let outcomes: Vec<TrialOutcome> = entries
        .par_iter()
        .map(|(trial, input)| {
            run_trial(trial, input, config).map_err(|e| {
                warn!(trial = %trial, error = %e, "trial failed");
                TrialFailure {
                    trial: (*trial).clone(),
                    error: AppError::from(e),
                }
            })
        })
        .collect();

    let failed = outcomes.iter().filter(|o| o.is_err()).count();
    info!(trials = outcomes.len(), failed, "batch finished");
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Linear ramp of width 0.2 centred on a front that moves from 0.1 to 0.9.
    fn moving_front_field(n_frames: usize, nz: usize) -> SaturationField {
        let rows: Vec<Vec<f64>> = (0..n_frames)
            .map(|i| {
                let front = 0.1 + 0.8 * i as f64 / (n_frames - 1) as f64;
                (0..nz)
                    .map(|j| {
                        let z = j as f64 / (nz - 1) as f64;
                        ((front - z) / 0.2 + 0.5).clamp(0.0, 1.0)
                    })
                    .collect()
            })
            .collect();
        SaturationField::from_rows(&rows).unwrap()
    }

    fn input(field: SaturationField, frame_dtau: f64) -> TrialInput {
        TrialInput {
            params: TrialParameters::dimensionless(frame_dtau),
            field,
        }
    }

    fn quick_config() -> FitConfig {
        FitConfig {
            max_iters: 40,
            ..FitConfig::default()
        }
    }

    #[test]
    fn end_to_end_trial_recovers_front_speed() {
        let field = moving_front_field(8, 20);
        let trial = TrialId::new("E2E");
        let report = run_trial(&trial, &input(field, 1.0 / 7.0), &quick_config()).unwrap();

        assert_eq!(report.front.len(), 8);
        assert_eq!(report.missing_fronts(), 0);
        assert_eq!(report.front.valid_pairs().count(), 8);
        assert_abs_diff_eq!(report.result().psi, 0.8, epsilon = 1e-9);

        let fit = report.result();
        assert!(fit.kappa.is_finite() && fit.kappa >= 0.0);
        assert!(fit.residual.is_finite() && fit.residual >= 0.0);
        assert!(report.grid.check_stability(fit.kappa, fit.psi).is_ok());
    }

    #[test]
    fn receding_front_is_rejected_before_the_solver() {
        let mut rows: Vec<Vec<f64>> = Vec::new();
        let field = moving_front_field(6, 15);
        for i in (0..6).rev() {
            rows.push(field.frame(i).collect());
        }
        let reversed = SaturationField::from_rows(&rows).unwrap();

        let err = run_trial(&TrialId::new("R"), &input(reversed, 0.2), &quick_config()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidParameter { name: "psi", .. }));
    }

    #[test]
    fn batch_keeps_going_past_a_failed_trial() {
        let mut trials = BTreeMap::new();
        trials.insert(TrialId::new("B_ok"), input(moving_front_field(6, 15), 0.2));
        // Never reaches the threshold: no front at all.
        let flat = SaturationField::from_rows(&vec![vec![0.1; 15]; 6]).unwrap();
        trials.insert(TrialId::new("A_flat"), input(flat, 0.2));

        let outcomes = run_batch(&trials, &quick_config());
        assert_eq!(outcomes.len(), 2);

        let failure = outcomes[0].as_ref().unwrap_err();
        assert_eq!(failure.trial.as_str(), "A_flat");
        assert_eq!(failure.error.exit_code(), 3);

        let report = outcomes[1].as_ref().unwrap();
        assert_eq!(report.trial.as_str(), "B_ok");
    }

    #[test]
    fn oversized_frame_spacing_is_an_unstable_grid() {
        let err = run_trial(&TrialId::new("W"), &input(moving_front_field(6, 15), 1e6), &quick_config()).unwrap_err();
        assert!(matches!(err, CoreError::UnstableGrid { .. }));
    }

    #[test]
    fn invalid_trial_parameters_fail_fast() {
        let mut bad = input(moving_front_field(6, 15), 0.2);
        bad.params.porosity = 1.5;
        let err = run_trial(&TrialId::new("P"), &bad, &quick_config()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidParameter { name: "porosity", .. }));
    }
}
