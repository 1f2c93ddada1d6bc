//! Front-velocity (psi) estimation.
//!
//! psi is the slope of a first-degree least-squares fit of front position `Z`
//! against dimensionless time `tau`. Frames without a front are dropped
//! pairwise before fitting.

use crate::domain::FrontSeries;
use crate::error::CoreError;
use crate::math::polyfit;

/// Minimum number of valid `(tau, Z)` pairs for a slope.
pub const MIN_SLOPE_PAIRS: usize = 2;

/// Slope of `Z` against `tau`, ignoring pairs where `Z` (or `tau`) is missing.
///
/// The fit only depends on the set of valid pairs, not their order.
pub fn fit_slope(tau: &[f64], z: &[Option<f64>]) -> Result<f64, CoreError> {
    let mut pairs: Vec<(f64, f64)> = tau
        .iter()
        .zip(z.iter())
        .filter_map(|(&t, z)| match z {
            Some(z) if t.is_finite() && z.is_finite() => Some((t, *z)),
            _ => None,
        })
        .collect();

    if pairs.len() < MIN_SLOPE_PAIRS {
        return Err(CoreError::InsufficientData {
            what: "valid (tau, Z) pairs",
            have: pairs.len(),
            need: MIN_SLOPE_PAIRS,
        });
    }

    // Canonical order so the floating-point result is bit-identical for any
    // permutation of the input.
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

    let (x, y): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
    let coef = polyfit(&x, &y, 1).ok_or_else(|| CoreError::InsufficientData {
        what: "distinct tau values",
        have: count_distinct(&x),
        need: MIN_SLOPE_PAIRS,
    })?;

    Ok(coef[1])
}

/// [`fit_slope`] over an extracted front series.
pub fn fit_front_slope(series: &FrontSeries) -> Result<f64, CoreError> {
    fit_slope(&series.tau, &series.z)
}

fn count_distinct(sorted: &[f64]) -> usize {
    let mut n = 0;
    let mut prev: Option<f64> = None;
    for &v in sorted {
        if prev != Some(v) {
            n += 1;
            prev = Some(v);
        }
    }
    n
}
