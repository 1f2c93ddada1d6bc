//! Saturation-front extraction.
//!
//! For every frame we look for the place along the column where saturation
//! crosses `threshold`. Each finite sample is classified as *above*
//! (`v >= threshold`) or *below* (`v < threshold`); a crossing sits between two
//! neighbouring finite samples of different class and is located by linear
//! interpolation between them.
//!
//! Conventions the downstream psi/kappa fits rely on:
//!
//! - no crossing in a frame (all above, all below, all NaN) -> `None`
//! - one crossing -> its interpolated position
//! - several crossings (noisy, non-monotone front) -> mean of their positions
//! - no interpolation across a NaN gap; a crossing hidden inside a gap is
//!   ambiguous and only the unambiguous crossings count
//!
//! Positions never leave `[0, 1]` because every estimate lies between two
//! sample positions.

use crate::domain::{FrontSeries, SaturationField, z_positions};

/// Front position of every frame of `field` at saturation `threshold`.
///
/// `tau` gives the dimensionless time of each frame and is copied into the
/// result; frames beyond `tau.len()` are not extracted.
pub fn extract_front(field: &SaturationField, tau: &[f64], threshold: f64) -> FrontSeries {
    let z = z_positions(field.n_positions());
    let n = field.n_frames().min(tau.len());

    let mut samples = Vec::with_capacity(field.n_positions());
    let fronts = (0..n)
        .map(|i| {
            samples.clear();
            samples.extend(field.frame(i));
            front_position(&samples, &z, threshold)
        })
        .collect();

    FrontSeries {
        tau: tau[..n].to_vec(),
        z: fronts,
    }
}

/// Front position within one frame, or `None` if there is no valid crossing.
pub fn front_position(values: &[f64], z: &[f64], threshold: f64) -> Option<f64> {
    if !threshold.is_finite() {
        return None;
    }

    let mut sum = 0.0;
    let mut count = 0usize;

    for j in 1..values.len().min(z.len()) {
        let (a, b) = (values[j - 1], values[j]);
        if !(a.is_finite() && b.is_finite()) {
            continue;
        }
        if (a >= threshold) == (b >= threshold) {
            continue;
        }

        let u = (threshold - a) / (b - a);
        sum += z[j - 1] + u.clamp(0.0, 1.0) * (z[j] - z[j - 1]);
        count += 1;
    }

    (count > 0).then(|| sum / count as f64)
}
