//! Golden section search on a bracket.
//!
//! Two interior points sit at the golden-ratio positions of `[left, right]`.
//! Each iteration evaluates one new point and discards the side of the
//! bracket that cannot hold the minimum, shrinking the width by `1/φ`.
//!
//! The objective may return non-finite values; they are treated as `+∞` so a
//! failed evaluation steers the search away instead of poisoning it.

use std::time::Instant;

/// The inverse golden ratio: 1/φ = φ - 1
const INV_PHI: f64 = 0.618_033_988_749_895;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoldenConfig {
    pub max_iters: usize,
    pub x_abs_tol: f64,
    pub x_rel_tol: f64,
    /// Stop when this instant has passed.
    pub deadline: Option<Instant>,
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Converged,
    MaxIters,
    TimeBudget,
}

/// Best point seen during the search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoldenSolution {
    pub x: f64,
    pub fx: f64,
    pub iters: usize,
    pub status: Status,
}

#[derive(Debug, Clone, Copy)]
struct Point {
    x: f64,
    fx: f64,
}

/// Minimize `f` on `bracket` (bounds may be given in either order).
pub fn minimize<F>(mut f: F, bracket: [f64; 2], config: &GoldenConfig) -> GoldenSolution
where
    F: FnMut(f64) -> f64,
{
    let [a, b] = bracket;
    let (mut left, mut right) = if a <= b { (a, b) } else { (b, a) };

    let mut eval = |x: f64| {
        let fx = f(x);
        Point {
            x,
            fx: if fx.is_finite() { fx } else { f64::INFINITY },
        }
    };

    let width = right - left;
    let mut inner_left = eval(left + (1.0 - INV_PHI) * width);
    let mut inner_right = eval(left + INV_PHI * width);
    let mut best = better(inner_left, inner_right);

    let finish = |best: Point, iters: usize, status: Status| GoldenSolution {
        x: best.x,
        fx: best.fx,
        iters,
        status,
    };

    for iter in 1..=config.max_iters {
        if right - left <= config.x_abs_tol + config.x_rel_tol * best.x.abs() {
            return finish(best, iter - 1, Status::Converged);
        }
        if config.deadline.is_some_and(|d| Instant::now() >= d) {
            return finish(best, iter - 1, Status::TimeBudget);
        }

        if inner_left.fx <= inner_right.fx {
            // Minimum lies in [left, inner_right].
            right = inner_right.x;
            inner_right = inner_left;
            inner_left = eval(left + (1.0 - INV_PHI) * (right - left));
            best = better(best, inner_left);
        } else {
            // Minimum lies in [inner_left, right].
            left = inner_left.x;
            inner_left = inner_right;
            inner_right = eval(left + INV_PHI * (right - left));
            best = better(best, inner_right);
        }
    }

    let status = if right - left <= config.x_abs_tol + config.x_rel_tol * best.x.abs() {
        Status::Converged
    } else {
        Status::MaxIters
    };
    finish(best, config.max_iters, status)
}

/// Lower objective wins; ties keep the incumbent.
fn better(incumbent: Point, challenger: Point) -> Point {
    if challenger.fx < incumbent.fx {
        challenger
    } else {
        incumbent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn config(max_iters: usize) -> GoldenConfig {
        GoldenConfig {
            max_iters,
            x_abs_tol: 1e-10,
            x_rel_tol: 1e-10,
            deadline: None,
        }
    }

    #[test]
    fn finds_parabola_minimum() {
        let sol = minimize(|x| (x - 2.0).powi(2), [0.0, 5.0], &config(200));
        assert_eq!(sol.status, Status::Converged);
        assert_abs_diff_eq!(sol.x, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn reversed_bracket_is_accepted() {
        let sol = minimize(|x| (x + 1.0).powi(2), [3.0, -4.0], &config(200));
        assert_abs_diff_eq!(sol.x, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn stops_at_iteration_budget() {
        let sol = minimize(|x| (x - 2.0).powi(2), [0.0, 5.0], &config(3));
        assert_eq!(sol.status, Status::MaxIters);
        assert_eq!(sol.iters, 3);
        assert!(sol.x.is_finite());
    }

    #[test]
    fn expired_deadline_stops_immediately() {
        let cfg = GoldenConfig {
            deadline: Some(Instant::now()),
            ..config(100)
        };
        let sol = minimize(|x| (x - 2.0).powi(2), [0.0, 5.0], &cfg);
        assert_eq!(sol.status, Status::TimeBudget);
        assert_eq!(sol.iters, 0);
    }

    #[test]
    fn nan_objective_is_avoided() {
        let sol = minimize(
            |x| if x > 3.0 { f64::NAN } else { (x - 1.0).powi(2) },
            [0.0, 5.0],
            &config(200),
        );
        assert_abs_diff_eq!(sol.x, 1.0, epsilon = 1e-6);
        assert!(sol.fx.is_finite());
    }
}
