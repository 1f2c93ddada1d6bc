//! Synthetic saturation fields generated by the transport model.
//!
//! Used for round-trip checks: simulate at a known `(kappa, psi)`, perturb the
//! solid phase like a camera would, then fit it back.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{InitialCondition, InletBoundary, SaturationField};
use crate::error::AppError;
use crate::models::{SimulationGrid, simulate};

/// How to perturb a simulated field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseSpec {
    /// Standard deviation of additive Gaussian noise (0 = none).
    pub sd: f64,
    /// Fraction of cells replaced by NaN, in `[0, 1)`.
    pub nan_fraction: f64,
    pub seed: u64,
}

impl Default for NoiseSpec {
    fn default() -> Self {
        Self {
            sd: 0.0,
            nan_fraction: 0.0,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticField {
    pub field: SaturationField,
    /// The noise-free solid phase the field was derived from.
    pub clean: SaturationField,
    pub nan_cells: usize,
}

/// Simulate the solid phase and apply `noise`.
///
/// Noisy values are clamped into `[0, 1]`; the inlet column is perturbed like
/// any other.
pub fn generate_field(
    grid: &SimulationGrid,
    kappa: f64,
    psi: f64,
    initial: InitialCondition,
    inlet: InletBoundary,
    noise: &NoiseSpec,
) -> Result<SyntheticField, AppError> {
    if !(noise.sd.is_finite() && noise.sd >= 0.0) {
        return Err(AppError::new(2, format!("Noise sd must be finite and >= 0 (got {}).", noise.sd)));
    }
    if !(0.0..1.0).contains(&noise.nan_fraction) {
        return Err(AppError::new(
            2,
            format!("NaN fraction must lie in [0, 1) (got {}).", noise.nan_fraction),
        ));
    }

    let simulated = simulate(grid, kappa, psi, initial, inlet)?;
    let clean = simulated.solid_field();

    let mut rng = StdRng::seed_from_u64(noise.seed);
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

    let mut values = clean.values().clone();
    let mut nan_cells = 0usize;
    for v in values.iter_mut() {
        // Draw both numbers for every cell so the noise pattern does not
        // depend on which cells end up missing.
        let eps: f64 = normal.sample(&mut rng);
        let drop: f64 = rng.r#gen();

        if noise.sd > 0.0 {
            *v = (*v + noise.sd * eps).clamp(0.0, 1.0);
        }
        if drop < noise.nan_fraction {
            *v = f64::NAN;
            nan_cells += 1;
        }
    }

    Ok(SyntheticField {
        field: SaturationField::new(values),
        clean,
        nan_cells,
    })
}
