//! Kappa seed grid generation.
//!
//! The kappa fit starts from a deterministic log-spaced scan around the
//! initial guess. The scan locates the basin of the residual minimum; golden
//! section then refines inside the bracket around the best seed.
//!
//! Log spacing because plausible mass-transfer coefficients span several
//! decades and the residual is far more sensitive at small kappa.

use crate::error::CoreError;

/// Decades the seed grid extends on either side of the guess.
pub const SEED_SPAN_DECADES: f64 = 2.0;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, CoreError> {
    if !(min.is_finite() && min > 0.0) {
        return Err(CoreError::invalid("kappa grid min", min, "must be finite and > 0"));
    }
    if !(max.is_finite() && max > min) {
        return Err(CoreError::invalid("kappa grid max", max, "must be finite and > min"));
    }
    if steps < 2 {
        return Err(CoreError::invalid("kappa grid steps", steps as f64, "must be >= 2"));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    // Pin the endpoints; exp(ln(x)) is not always exactly x.
    out[0] = min;
    out[steps - 1] = max;
    Ok(out)
}

/// Seed kappas around `guess`, capped at `ceiling`.
///
/// The grid covers `guess / 100 .. guess * 100`; when the ceiling cuts into
/// that range the grid slides down so it still spans four decades.
pub fn kappa_seed_grid(guess: f64, ceiling: f64, steps: usize) -> Result<Vec<f64>, CoreError> {
    if !(guess.is_finite() && guess > 0.0) {
        return Err(CoreError::invalid("kappa guess", guess, "must be finite and > 0"));
    }
    if !(ceiling > 0.0) {
        return Err(CoreError::invalid("kappa ceiling", ceiling, "must be > 0"));
    }

    let span = 10f64.powf(SEED_SPAN_DECADES);
    let hi = (guess * span).min(ceiling);
    let lo = (guess / span).min(hi / (span * span));
    log_space(lo, hi, steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(0.1, 10.0, 5).unwrap();
        assert_eq!(v[0], 0.1);
        assert_eq!(v[4], 10.0);
        assert!((v[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn seed_grid_brackets_guess() {
        let grid = kappa_seed_grid(2.0, 1e6, 9).unwrap();
        assert!((grid[0] - 0.02).abs() < 1e-15);
        assert!((grid[8] - 200.0).abs() < 1e-12);
        assert!(grid.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn seed_grid_respects_ceiling() {
        let grid = kappa_seed_grid(10.0, 30.0, 7).unwrap();
        assert_eq!(*grid.last().unwrap(), 30.0);
        assert!(grid[0] <= 0.1);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(log_space(0.0, 1.0, 5).is_err());
        assert!(log_space(1.0, 1.0, 5).is_err());
        assert!(kappa_seed_grid(f64::NAN, 10.0, 5).is_err());
        assert!(kappa_seed_grid(1.0, 0.0, 5).is_err());
    }
}
