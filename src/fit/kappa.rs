//! Mass-transfer coefficient (kappa) calibration.
//!
//! For a fixed psi, the objective is the residual between the measured
//! saturation field and the simulated solid phase:
//!
//! ```text
//! R(kappa) = Σ (S_sim(tau_i, Z_j; kappa, psi) - S_meas(i, j))^2
//! ```
//!
//! over cells where the measurement is finite (optionally divided by the
//! number of such cells, see [`ResidualMetric`]).
//!
//! The search has two stages:
//!
//! 1. a log-spaced seed scan around the guess (parallel, deterministic), and
//! 2. golden-section refinement inside the bracket of the best seed.
//!
//! Every candidate is clamped into `[0, min(kappa_max, grid ceiling)]` before
//! the solver sees it, so the solver never runs outside its stability bound
//! and never receives a negative or non-finite coefficient.
//!
//! Running out of iterations or wall-clock budget is not an error: the best
//! kappa found so far comes back with `converged = false`. The wall-clock
//! budget is checked between seed chunks as well as between golden steps.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{FitConfig, FitResult, InitialCondition, InletBoundary, ResidualMetric, SaturationField};
use crate::error::CoreError;
use crate::fit::golden::{self, GoldenConfig, Status};
use crate::fit::kappa_grid::kappa_seed_grid;
use crate::models::{SimulatedField, SimulationGrid, simulate};

/// Options that affect how kappa is calibrated.
#[derive(Debug, Clone)]
pub struct KappaFitOptions {
    /// Upper end of the search; the grid's stability ceiling may lower it.
    pub kappa_max: f64,
    pub seed_points: usize,
    /// Golden-section iteration budget.
    pub max_iters: usize,
    pub time_budget: Option<Duration>,
    pub x_abs_tol: f64,
    pub x_rel_tol: f64,
    pub metric: ResidualMetric,
    pub initial: InitialCondition,
    pub inlet: InletBoundary,
}

impl Default for KappaFitOptions {
    fn default() -> Self {
        Self::from(&FitConfig::default())
    }
}

impl From<&FitConfig> for KappaFitOptions {
    fn from(config: &FitConfig) -> Self {
        Self {
            kappa_max: config.kappa_max,
            seed_points: config.kappa_seed_points,
            max_iters: config.max_iters,
            time_budget: config.time_budget,
            x_abs_tol: config.x_abs_tol,
            x_rel_tol: config.x_rel_tol,
            metric: config.metric,
            initial: config.initial,
            inlet: config.inlet,
        }
    }
}

/// Why the kappa search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Converged,
    MaxIters,
    TimeBudget,
}

impl From<Status> for StopReason {
    fn from(status: Status) -> Self {
        match status {
            Status::Converged => StopReason::Converged,
            Status::MaxIters => StopReason::MaxIters,
            Status::TimeBudget => StopReason::TimeBudget,
        }
    }
}

/// One objective evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub kappa: f64,
    pub objective: f64,
}

/// A kappa fit with its search history.
#[derive(Debug, Clone)]
pub struct KappaSearch {
    pub result: FitResult,
    /// Seed scan first, then golden-section evaluations in order.
    pub trace: Vec<Evaluation>,
    pub iterations: usize,
    pub stop: StopReason,
    /// Largest kappa the search was allowed to try.
    pub kappa_upper: f64,
}

/// Calibrate kappa against `measured` for a fixed `psi`.
pub fn fit_kappa(
    measured: &SaturationField,
    grid: &SimulationGrid,
    psi: f64,
    initial_kappa_guess: f64,
    opts: &KappaFitOptions,
) -> Result<FitResult, CoreError> {
    fit_kappa_traced(measured, grid, psi, initial_kappa_guess, opts).map(|search| search.result)
}

/// [`fit_kappa`], also returning the evaluation trace and stop reason.
pub fn fit_kappa_traced(
    measured: &SaturationField,
    grid: &SimulationGrid,
    psi: f64,
    initial_kappa_guess: f64,
    opts: &KappaFitOptions,
) -> Result<KappaSearch, CoreError> {
    let started = Instant::now();

    if !(psi.is_finite() && psi >= 0.0) {
        return Err(CoreError::invalid("psi", psi, "must be finite and >= 0"));
    }
    if !(initial_kappa_guess.is_finite() && initial_kappa_guess > 0.0) {
        return Err(CoreError::invalid(
            "initial_kappa_guess",
            initial_kappa_guess,
            "must be finite and > 0",
        ));
    }
    if !(opts.kappa_max.is_finite() && opts.kappa_max > 0.0) {
        return Err(CoreError::invalid("kappa_max", opts.kappa_max, "must be finite and > 0"));
    }
    grid.validate()?;
    if grid.nz != measured.n_positions() {
        return Err(CoreError::invalid("grid.nz", grid.nz as f64, "must match measured columns"));
    }
    if grid.n_frames != measured.n_frames() {
        return Err(CoreError::invalid(
            "grid.n_frames",
            grid.n_frames as f64,
            "must match measured frames",
        ));
    }
    if measured.finite_count() == 0 {
        return Err(CoreError::InsufficientData {
            what: "finite measured cells",
            have: 0,
            need: 1,
        });
    }

    let upper = grid.kappa_ceiling(psi)?.min(opts.kappa_max);
    if upper < opts.kappa_max {
        debug!(
            ceiling = upper,
            kappa_max = opts.kappa_max,
            "grid stability caps the kappa search"
        );
    }

    let objective = Objective {
        measured,
        grid,
        psi,
        upper,
        opts,
    };

    // Only kappa = 0 is admissible; nothing to search.
    if upper <= 0.0 {
        let fx = objective.eval(0.0);
        return Ok(KappaSearch {
            result: FitResult {
                psi,
                kappa: 0.0,
                residual: fx,
                converged: true,
            },
            trace: vec![Evaluation { kappa: 0.0, objective: fx }],
            iterations: 0,
            stop: StopReason::Converged,
            kappa_upper: upper,
        });
    }

    let deadline = opts.time_budget.map(|budget| started + budget);

    // Stage 1: seed scan, one parallel chunk at a time so the deadline is
    // seen between chunks. The first chunk always runs.
    let seeds = kappa_seed_grid(initial_kappa_guess.min(upper), upper, opts.seed_points.max(3))?;
    let chunk = rayon::current_num_threads().max(1);
    let mut seed_values: Vec<f64> = Vec::with_capacity(seeds.len());
    for batch in seeds.chunks(chunk) {
        if !seed_values.is_empty() && deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        let values: Vec<f64> = batch.par_iter().map(|&k| objective.eval(k)).collect();
        seed_values.extend(values);
    }

    let mut trace: Vec<Evaluation> = seeds
        .iter()
        .zip(seed_values.iter())
        .map(|(&kappa, &objective)| Evaluation { kappa, objective })
        .collect();

    // Deterministic selection: minimum objective, ties to the lower grid index.
    let mut best_idx = 0;
    for (i, &v) in seed_values.iter().enumerate().skip(1) {
        if v < seed_values[best_idx] {
            best_idx = i;
        }
    }
    let seed_best = trace[best_idx];

    if seed_values.len() < seeds.len() {
        warn!(
            kappa = seed_best.kappa,
            evaluated = seed_values.len(),
            seeds = seeds.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "kappa seed scan hit the time budget; returning best seed"
        );
        return Ok(KappaSearch {
            result: FitResult {
                psi,
                kappa: seed_best.kappa,
                residual: seed_best.objective,
                converged: false,
            },
            trace,
            iterations: 0,
            stop: StopReason::TimeBudget,
            kappa_upper: upper,
        });
    }

    let left = if best_idx == 0 { 0.0 } else { seeds[best_idx - 1] };
    let right = if best_idx + 1 == seeds.len() { upper } else { seeds[best_idx + 1] };
    debug!(kappa = seed_best.kappa, objective = seed_best.objective, left, right, "seed scan done");

    // Stage 2: golden-section refinement.
    let config = GoldenConfig {
        max_iters: opts.max_iters,
        x_abs_tol: opts.x_abs_tol,
        x_rel_tol: opts.x_rel_tol,
        deadline,
    };
    let refined = golden::minimize(
        |k| {
            let objective = objective.eval(k);
            trace.push(Evaluation { kappa: k, objective });
            objective
        },
        [left, right],
        &config,
    );

    let (kappa, residual) = if refined.fx < seed_best.objective {
        (refined.x, refined.fx)
    } else {
        (seed_best.kappa, seed_best.objective)
    };
    let stop = StopReason::from(refined.status);

    match stop {
        StopReason::Converged => {}
        StopReason::MaxIters => warn!(
            kappa,
            iterations = refined.iters,
            "kappa fit hit the iteration budget; returning best candidate"
        ),
        StopReason::TimeBudget => warn!(
            kappa,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "kappa fit hit the time budget; returning best candidate"
        ),
    }
    if !residual.is_finite() {
        warn!(kappa, "no candidate produced a finite residual");
    }
    if (upper - kappa).abs() <= opts.x_abs_tol + opts.x_rel_tol * upper {
        warn!(kappa, upper, "fitted kappa sits on the search ceiling");
    }

    Ok(KappaSearch {
        result: FitResult {
            psi,
            kappa,
            residual,
            converged: stop == StopReason::Converged && residual.is_finite(),
        },
        trace,
        iterations: refined.iters,
        stop,
        kappa_upper: upper,
    })
}

/// Residual between the simulated solid phase and the measurement.
///
/// Cells where the measurement is NaN are skipped. Returns `None` when no cell
/// is usable or the shapes differ.
pub fn residual(measured: &SaturationField, simulated: &SimulatedField, metric: ResidualMetric) -> Option<f64> {
    let solid = &simulated.solid;
    if solid.shape() != measured.values().shape() {
        return None;
    }

    let mut sum_sq = 0.0;
    let mut n = 0usize;
    for (sim, meas) in solid.iter().zip(measured.values().iter()) {
        if meas.is_finite() {
            let r = sim - meas;
            sum_sq += r * r;
            n += 1;
        }
    }
    (n > 0).then(|| metric.finish(sum_sq, n))
}

struct Objective<'a> {
    measured: &'a SaturationField,
    grid: &'a SimulationGrid,
    psi: f64,
    upper: f64,
    opts: &'a KappaFitOptions,
}

impl Objective<'_> {
    /// Residual at `kappa`, `+∞` for anything that cannot be evaluated.
    fn eval(&self, kappa: f64) -> f64 {
        let Some(kappa) = clamp_candidate(kappa, self.upper) else {
            return f64::INFINITY;
        };

        match simulate(self.grid, kappa, self.psi, self.opts.initial, self.opts.inlet) {
            Ok(sim) => residual(self.measured, &sim, self.opts.metric)
                .filter(|v| v.is_finite())
                .unwrap_or(f64::INFINITY),
            Err(err) => {
                debug!(kappa, %err, "simulation failed during kappa search");
                f64::INFINITY
            }
        }
    }
}

/// Clamp a proposed kappa into `[0, upper]`; non-finite proposals are dropped.
fn clamp_candidate(kappa: f64, upper: f64) -> Option<f64> {
    kappa.is_finite().then(|| kappa.clamp(0.0, upper))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn synthetic(kappa: f64, psi: f64, grid: &SimulationGrid) -> SaturationField {
        simulate(grid, kappa, psi, InitialCondition::clean_bed(), InletBoundary::default())
            .unwrap()
            .solid_field()
    }

    fn test_grid(kappa_max: f64, psi: f64) -> SimulationGrid {
        SimulationGrid {
            nz: 21,
            n_frames: 41,
            frame_dtau: 0.05,
            substeps: SimulationGrid::stable_substeps(21, 0.05, kappa_max, psi).unwrap(),
        }
    }

    fn options(kappa_max: f64) -> KappaFitOptions {
        KappaFitOptions {
            kappa_max,
            ..KappaFitOptions::default()
        }
    }

    #[test]
    fn recovers_kappa_from_simulated_data() {
        let psi = 0.8;
        let grid = test_grid(50.0, psi);
        let measured = synthetic(4.0, psi, &grid);

        let fit = fit_kappa(&measured, &grid, psi, 1.0, &options(50.0)).unwrap();
        assert!(fit.converged);
        assert_relative_eq!(fit.kappa, 4.0, max_relative = 1e-4);
        assert!(fit.residual < 1e-8);
        assert_eq!(fit.psi, psi);
    }

    #[test]
    fn recovery_ignores_missing_cells() {
        let psi = 0.5;
        let grid = test_grid(50.0, psi);
        let clean = synthetic(2.5, psi, &grid);

        let mut values = clean.values().clone();
        let mut rng = StdRng::seed_from_u64(7);
        for v in values.iter_mut() {
            if rng.gen_bool(0.2) {
                *v = f64::NAN;
            }
        }
        let measured = SaturationField::new(values);

        let opts = KappaFitOptions {
            metric: ResidualMetric::Mse,
            ..options(50.0)
        };
        let fit = fit_kappa(&measured, &grid, psi, 10.0, &opts).unwrap();
        assert_relative_eq!(fit.kappa, 2.5, max_relative = 1e-4);
    }

    #[test]
    fn exhausted_budget_returns_best_candidate() {
        let psi = 0.8;
        let grid = test_grid(50.0, psi);

        // Pure noise: no kappa explains it.
        let mut rng = StdRng::seed_from_u64(11);
        let rows: Vec<Vec<f64>> = (0..grid.n_frames)
            .map(|_| (0..grid.nz).map(|_| rng.gen_range(0.0..1.0)).collect())
            .collect();
        let measured = SaturationField::from_rows(&rows).unwrap();

        let opts = KappaFitOptions {
            max_iters: 2,
            ..options(50.0)
        };
        let search = fit_kappa_traced(&measured, &grid, psi, 1.0, &opts).unwrap();
        assert!(!search.result.converged);
        assert_eq!(search.stop, StopReason::MaxIters);
        assert!(search.result.kappa.is_finite());
        assert!(search.result.kappa >= 0.0 && search.result.kappa <= search.kappa_upper);
        assert!(search.result.residual.is_finite());
    }

    #[test]
    fn zero_time_budget_still_returns_a_fit() {
        let psi = 0.8;
        let grid = test_grid(50.0, psi);
        let measured = synthetic(4.0, psi, &grid);

        let opts = KappaFitOptions {
            time_budget: Some(Duration::ZERO),
            ..options(50.0)
        };
        let search = fit_kappa_traced(&measured, &grid, psi, 1.0, &opts).unwrap();
        assert_eq!(search.stop, StopReason::TimeBudget);
        assert!(!search.result.converged);
        assert!(search.result.kappa.is_finite());
    }

    #[test]
    fn time_budget_stops_the_seed_scan() {
        let psi = 0.8;
        let grid = SimulationGrid {
            nz: 401,
            n_frames: 400,
            frame_dtau: 0.05,
            substeps: SimulationGrid::stable_substeps(401, 0.05, 50.0, psi).unwrap(),
        };
        let measured = synthetic(4.0, psi, &grid);

        // One simulation already takes longer than the budget.
        let single = Instant::now();
        let _ = synthetic(4.0, psi, &grid);
        let one_sim = single.elapsed();
        assert!(one_sim > Duration::from_millis(1));

        let opts = KappaFitOptions {
            seed_points: 200,
            time_budget: Some(Duration::from_millis(1)),
            ..options(50.0)
        };
        let started = Instant::now();
        let search = fit_kappa_traced(&measured, &grid, psi, 1.0, &opts).unwrap();
        let elapsed = started.elapsed();

        assert_eq!(search.stop, StopReason::TimeBudget);
        assert!(!search.result.converged);
        assert!(search.result.kappa.is_finite());
        assert_eq!(search.iterations, 0);
        assert!(search.trace.len() <= rayon::current_num_threads().max(1));
        assert!(search.trace.len() < 200);
        // Roughly one parallel chunk of simulations, far from the full scan.
        assert!(
            elapsed < one_sim * 10 + Duration::from_millis(200),
            "elapsed {elapsed:?}, one simulation {one_sim:?}"
        );
    }

    #[test]
    fn search_never_leaves_stable_range() {
        let psi = 0.8;
        // Coarse grid: the stability ceiling is far below kappa_max.
        let grid = SimulationGrid {
            nz: 21,
            n_frames: 41,
            frame_dtau: 0.02,
            substeps: 1,
        };
        let ceiling = grid.kappa_ceiling(psi).unwrap();
        let measured = synthetic(ceiling * 0.5, psi, &grid);

        let search = fit_kappa_traced(&measured, &grid, psi, 100.0, &options(1e4)).unwrap();
        assert!(search.kappa_upper <= ceiling);
        assert!(search.trace.iter().all(|e| e.objective.is_finite()));
        assert!(search.trace.iter().all(|e| e.kappa >= 0.0 && e.kappa <= ceiling));
    }

    #[test]
    fn rejects_invalid_inputs() {
        let grid = test_grid(50.0, 0.8);
        let measured = synthetic(4.0, 0.8, &grid);
        let opts = options(50.0);

        assert!(matches!(
            fit_kappa(&measured, &grid, -0.1, 1.0, &opts),
            Err(CoreError::InvalidParameter { name: "psi", .. })
        ));
        assert!(matches!(
            fit_kappa(&measured, &grid, 0.8, f64::INFINITY, &opts),
            Err(CoreError::InvalidParameter { name: "initial_kappa_guess", .. })
        ));

        let wrong_shape = SimulationGrid { nz: 11, ..grid };
        assert!(fit_kappa(&measured, &wrong_shape, 0.8, 1.0, &opts).is_err());

        let empty = SaturationField::from_rows(&vec![vec![f64::NAN; 21]; 41]).unwrap();
        assert!(matches!(
            fit_kappa(&empty, &grid, 0.8, 1.0, &opts),
            Err(CoreError::InsufficientData { .. })
        ));
    }

    #[test]
    fn clamp_candidate_rules() {
        assert_eq!(clamp_candidate(-3.0, 10.0), Some(0.0));
        assert_eq!(clamp_candidate(30.0, 10.0), Some(10.0));
        assert_eq!(clamp_candidate(f64::NAN, 10.0), None);
        assert_eq!(clamp_candidate(f64::INFINITY, 10.0), None);
    }

    #[test]
    fn residual_metrics() {
        let grid = SimulationGrid {
            nz: 2,
            n_frames: 1,
            frame_dtau: 0.1,
            substeps: 1,
        };
        let sim = simulate(&grid, 0.0, 0.0, InitialCondition::clean_bed(), InletBoundary::default()).unwrap();
        let measured = SaturationField::from_rows(&[vec![0.5, f64::NAN]]).unwrap();
        assert_relative_eq!(residual(&measured, &sim, ResidualMetric::Sse).unwrap(), 0.25);
        assert_relative_eq!(residual(&measured, &sim, ResidualMetric::Mse).unwrap(), 0.25);

        let measured = SaturationField::from_rows(&[vec![0.5, 0.1]]).unwrap();
        assert_relative_eq!(residual(&measured, &sim, ResidualMetric::Sse).unwrap(), 0.26);
        assert_relative_eq!(residual(&measured, &sim, ResidualMetric::Mse).unwrap(), 0.13);
    }
}
