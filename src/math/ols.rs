//! Ordinary least squares.
//!
//! The slope fitter solves tiny linear regressions of the form:
//!
//! ```text
//! minimize Σ (y_i - x_i^T β)^2
//! ```
//!
//! We solve through SVD rather than the normal equations so that nearly
//! collinear designs (e.g. frames bunched at almost the same tau) degrade
//! gracefully instead of blowing up. Nalgebra's `QR::solve` is for square
//! systems only, so it is not an option for tall designs.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Fit a polynomial of the given degree to `(x, y)` samples.
///
/// Coefficients are returned lowest order first (`[intercept, slope, ...]`).
/// Returns `None` when there are fewer samples than coefficients or the
/// design is singular.
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Option<Vec<f64>> {
    let n = x.len();
    let p = degree + 1;
    if n != y.len() || n < p {
        return None;
    }

    let design = DMatrix::from_fn(n, p, |i, j| x[i].powi(j as i32));
    let rhs = DVector::from_column_slice(y);

    // A rank-deficient design still "solves" through SVD with a minimum-norm
    // answer; for a fit that answer is meaningless, so reject it up front.
    if design.rank(1e-10) < p {
        return None;
    }

    solve_least_squares(&design, &rhs).map(|beta| beta.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn polyfit_degree_one_matches_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [0.1, 0.35, 0.6, 0.85];
        let coef = polyfit(&x, &y, 1).unwrap();
        assert!((coef[0] - 0.1).abs() < 1e-12);
        assert!((coef[1] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn polyfit_rejects_degenerate_design() {
        assert!(polyfit(&[1.0], &[2.0], 1).is_none());
        assert!(polyfit(&[1.0, 1.0, 1.0], &[0.0, 1.0, 2.0], 1).is_none());
    }
}
