//! Explicit finite-difference solver for the coupled adsorption equations.
//!
//! ```text
//! dG/dtau = -dG/dZ - kappa (G - S)      gas phase, advected toward Z = 1
//! dS/dtau = psi kappa (G - S)           solid phase, no transport
//! ```
//!
//! Discretization on `Z_j = j dZ`, `dZ = 1/(nz-1)`:
//!
//! ```text
//! G[j]' = G[j] - r (G[j] - G[j-1]) - dtau kappa (G[j] - S[j])    j >= 1
//! G[0]' = inlet
//! S[j]' = S[j] + dtau psi kappa (G[j] - S[j])                     all j
//! ```
//!
//! with `r = dtau/dZ`. Every update is a convex combination of old values as
//! long as
//!
//! ```text
//! r + dtau kappa <= 1      and      dtau psi kappa <= 1
//! ```
//!
//! so `G` and `S` stay between the smallest and largest initial/inlet value.
//! Grids outside that bound are refused with [`CoreError::UnstableGrid`]; the
//! caller decides whether to refine.

use nalgebra::DMatrix;

use crate::domain::{InitialCondition, InletBoundary, SaturationField};
use crate::error::CoreError;

/// Rounding slack on the stability bound.
const STABILITY_SLACK: f64 = 1e-12;

/// Upper limit on explicit steps per output frame.
pub const MAX_SUBSTEPS: usize = 100_000;

/// Space/time layout of a simulation.
///
/// Output frames sit at `tau_i = i * frame_dtau`; between frames the solver
/// takes `substeps` explicit steps of `frame_dtau / substeps`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationGrid {
    pub nz: usize,
    pub n_frames: usize,
    pub frame_dtau: f64,
    pub substeps: usize,
}

impl SimulationGrid {
    /// Grid with the same frames and spatial bins as `field`.
    pub fn aligned_with(field: &SaturationField, frame_dtau: f64, substeps: usize) -> Self {
        Self {
            nz: field.n_positions(),
            n_frames: field.n_frames(),
            frame_dtau,
            substeps,
        }
    }

    pub fn dz(&self) -> f64 {
        1.0 / (self.nz as f64 - 1.0)
    }

    pub fn dtau(&self) -> f64 {
        self.frame_dtau / self.substeps as f64
    }

    /// `dtau / dz`
    pub fn courant(&self) -> f64 {
        self.dtau() / self.dz()
    }

    pub fn tau_max(&self) -> f64 {
        self.n_frames.saturating_sub(1) as f64 * self.frame_dtau
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.nz < 2 {
            return Err(CoreError::invalid("nz", self.nz as f64, "need at least 2 spatial nodes"));
        }
        if self.n_frames == 0 {
            return Err(CoreError::invalid("n_frames", 0.0, "need at least 1 frame"));
        }
        if !(self.frame_dtau.is_finite() && self.frame_dtau > 0.0) {
            return Err(CoreError::invalid("frame_dtau", self.frame_dtau, "must be finite and > 0"));
        }
        if self.substeps == 0 || self.substeps > MAX_SUBSTEPS {
            return Err(CoreError::invalid(
                "substeps",
                self.substeps as f64,
                "must lie in 1..=MAX_SUBSTEPS",
            ));
        }
        Ok(())
    }

    /// Check the monotonicity bound for the given coefficients.
    pub fn check_stability(&self, kappa: f64, psi: f64) -> Result<(), CoreError> {
        let dtau = self.dtau();
        let courant = self.courant();
        let exchange = dtau * kappa;
        let uptake = dtau * psi * kappa;

        if courant + exchange > 1.0 + STABILITY_SLACK || uptake > 1.0 + STABILITY_SLACK {
            return Err(CoreError::UnstableGrid {
                courant,
                exchange,
                uptake,
                dtau,
                dz: self.dz(),
            });
        }
        Ok(())
    }

    /// Largest kappa this grid can run at for the given psi.
    ///
    /// Fails with [`CoreError::UnstableGrid`] when the advection step alone
    /// already breaks the bound.
    pub fn kappa_ceiling(&self, psi: f64) -> Result<f64, CoreError> {
        self.validate()?;
        self.check_stability(0.0, psi)?;

        let dtau = self.dtau();
        let by_exchange = (1.0 - self.courant()).max(0.0) / dtau;
        let by_uptake = if psi > 0.0 { 1.0 / (psi * dtau) } else { f64::INFINITY };
        Ok(by_exchange.min(by_uptake))
    }

    /// Smallest substep count that keeps every `kappa <= kappa_max` stable.
    ///
    /// Fails with [`CoreError::UnstableGrid`] when even [`MAX_SUBSTEPS`] steps
    /// per frame are not enough; a coarser frame spacing or a lower
    /// `kappa_max` is then up to the caller.
    pub fn stable_substeps(nz: usize, frame_dtau: f64, kappa_max: f64, psi: f64) -> Result<usize, CoreError> {
        let mut grid = SimulationGrid {
            nz,
            n_frames: 1,
            frame_dtau,
            substeps: 1,
        };
        grid.validate()?;
        if !(kappa_max.is_finite() && kappa_max >= 0.0) {
            return Err(CoreError::invalid("kappa_max", kappa_max, "must be finite and >= 0"));
        }
        if !(psi.is_finite() && psi >= 0.0) {
            return Err(CoreError::invalid("psi", psi, "must be finite and >= 0"));
        }

        let rate = (1.0 / grid.dz() + kappa_max).max(psi * kappa_max);
        let needed = (frame_dtau * rate).ceil().max(1.0);
        if !(needed <= MAX_SUBSTEPS as f64) {
            grid.substeps = MAX_SUBSTEPS;
            grid.check_stability(kappa_max, psi)?;
            return Ok(MAX_SUBSTEPS);
        }
        grid.substeps = needed as usize;

        // Rounding in the ceil above can leave us a hair outside the bound.
        while let Err(err) = grid.check_stability(kappa_max, psi) {
            if grid.substeps >= MAX_SUBSTEPS {
                return Err(err);
            }
            grid.substeps += 1;
        }
        Ok(grid.substeps)
    }
}

/// Simulated gas and solid fields, `n_frames x nz`, frame 0 = initial state.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedField {
    pub gas: DMatrix<f64>,
    pub solid: DMatrix<f64>,
}

impl SimulatedField {
    /// The solid phase, in the layout of a measured field.
    pub fn solid_field(&self) -> SaturationField {
        SaturationField::new(self.solid.clone())
    }
}

/// Run the explicit march.
///
/// The result depends only on the arguments; nothing is cached between calls.
pub fn simulate(
    grid: &SimulationGrid,
    kappa: f64,
    psi: f64,
    initial: InitialCondition,
    inlet: InletBoundary,
) -> Result<SimulatedField, CoreError> {
    validate_coefficient("kappa", kappa)?;
    validate_coefficient("psi", psi)?;
    for (name, value) in [
        ("initial.gas", initial.gas),
        ("initial.solid", initial.solid),
        ("inlet.gas", inlet.gas),
    ] {
        if !value.is_finite() {
            return Err(CoreError::invalid(name, value, "must be finite"));
        }
    }
    grid.validate()?;
    grid.check_stability(kappa, psi)?;

    let nz = grid.nz;
    let r = grid.courant();
    let ek = grid.dtau() * kappa;
    let uk = grid.dtau() * psi * kappa;

    let mut g = vec![initial.gas; nz];
    let mut s = vec![initial.solid; nz];
    g[0] = inlet.gas;
    let mut g_next = g.clone();
    let mut s_next = s.clone();

    let mut gas = DMatrix::zeros(grid.n_frames, nz);
    let mut solid = DMatrix::zeros(grid.n_frames, nz);
    record(&mut gas, &mut solid, 0, &g, &s);

    for frame in 1..grid.n_frames {
        for _ in 0..grid.substeps {
            g_next[0] = inlet.gas;
            for j in 1..nz {
                g_next[j] = g[j] - r * (g[j] - g[j - 1]) - ek * (g[j] - s[j]);
            }
            for j in 0..nz {
                s_next[j] = s[j] + uk * (g[j] - s[j]);
            }
            std::mem::swap(&mut g, &mut g_next);
            std::mem::swap(&mut s, &mut s_next);
        }
        record(&mut gas, &mut solid, frame, &g, &s);
    }

    Ok(SimulatedField { gas, solid })
}

fn validate_coefficient(name: &'static str, value: f64) -> Result<(), CoreError> {
    if !value.is_finite() {
        return Err(CoreError::invalid(name, value, "must be finite"));
    }
    if value < 0.0 {
        return Err(CoreError::invalid(name, value, "must be >= 0"));
    }
    Ok(())
}

fn record(gas: &mut DMatrix<f64>, solid: &mut DMatrix<f64>, frame: usize, g: &[f64], s: &[f64]) {
    for j in 0..g.len() {
        gas[(frame, j)] = g[j];
        solid[(frame, j)] = s[j];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(nz: usize, n_frames: usize, frame_dtau: f64, substeps: usize) -> SimulationGrid {
        SimulationGrid {
            nz,
            n_frames,
            frame_dtau,
            substeps,
        }
    }

    #[test]
    fn zero_kappa_leaves_solid_untouched() {
        let g = grid(11, 20, 0.05, 1);
        let initial = InitialCondition { gas: 0.0, solid: 0.3 };
        let out = simulate(&g, 0.0, 0.8, initial, InletBoundary::default()).unwrap();
        assert!(out.solid.iter().all(|&v| v == 0.3));

        // The gas front still advects in from the inlet.
        assert_eq!(out.gas[(19, 0)], 1.0);
        assert!(out.gas[(19, 5)] > 0.0);
    }

    #[test]
    fn rejects_grid_outside_stability_bound() {
        // dz = 0.1, dtau = 0.05: courant = 0.5, exchange = 0.05 * 12 = 0.6
        let g = grid(11, 5, 0.05, 1);
        let err = simulate(&g, 12.0, 0.5, InitialCondition::clean_bed(), InletBoundary::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::UnstableGrid { .. }));

        // Pure advection with courant > 1.
        let g = grid(11, 5, 0.2, 1);
        let err = simulate(&g, 0.0, 0.0, InitialCondition::clean_bed(), InletBoundary::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::UnstableGrid { .. }));
    }

    #[test]
    fn accepts_grid_just_inside_bound_without_blowup() {
        // courant = 0.5, exchange = 0.05 * 9.9 = 0.495, uptake = 0.495 * 2 = 0.99
        let g = grid(11, 200, 0.05, 1);
        let out = simulate(&g, 9.9, 2.0, InitialCondition::clean_bed(), InletBoundary::default()).unwrap();
        for v in out.gas.iter().chain(out.solid.iter()) {
            assert!(v.is_finite());
            assert!((-1e-12..=1.0 + 1e-12).contains(v), "value {v} left [0, 1]");
        }
    }

    #[test]
    fn rejects_non_physical_coefficients() {
        let g = grid(11, 5, 0.01, 1);
        let bc = InletBoundary::default();
        let ic = InitialCondition::clean_bed();
        assert!(matches!(
            simulate(&g, -1.0, 0.5, ic, bc),
            Err(CoreError::InvalidParameter { name: "kappa", .. })
        ));
        assert!(matches!(
            simulate(&g, 1.0, f64::NAN, ic, bc),
            Err(CoreError::InvalidParameter { name: "psi", .. })
        ));
    }

    #[test]
    fn bed_saturates_toward_inlet_value() {
        let g = grid(21, 400, 0.05, 5);
        let out = simulate(&g, 5.0, 1.0, InitialCondition::clean_bed(), InletBoundary::default()).unwrap();
        let last = g.n_frames - 1;
        assert!(out.solid[(last, 0)] > 0.99);
        assert!(out.solid[(last, 20)] > 0.9);

        // Solid uptake is monotone in time at the outlet.
        for i in 1..g.n_frames {
            assert!(out.solid[(i, 20)] >= out.solid[(i - 1, 20)] - 1e-12);
        }
    }

    #[test]
    fn repeated_calls_are_identical() {
        let g = grid(11, 30, 0.05, 2);
        let ic = InitialCondition::clean_bed();
        let bc = InletBoundary::default();
        let a = simulate(&g, 3.0, 0.7, ic, bc).unwrap();
        let _ = simulate(&g, 8.0, 0.2, ic, bc).unwrap();
        let b = simulate(&g, 3.0, 0.7, ic, bc).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn kappa_ceiling_and_stable_substeps_agree() {
        let g = grid(21, 10, 0.02, 1);
        let ceiling = g.kappa_ceiling(0.8).unwrap();
        assert!(g.check_stability(ceiling, 0.8).is_ok());
        assert!(g.check_stability(ceiling * 1.01, 0.8).is_err());

        let m = SimulationGrid::stable_substeps(21, 0.5, 50.0, 0.8).unwrap();
        let refined = grid(21, 10, 0.5, m);
        assert!(refined.check_stability(50.0, 0.8).is_ok());
        let coarser = grid(21, 10, 0.5, m - 1);
        assert!(coarser.check_stability(50.0, 0.8).is_err());
    }

    #[test]
    fn stable_substeps_refuses_huge_frame_spacing() {
        // 219 million steps per frame would be needed.
        let err = SimulationGrid::stable_substeps(20, 1e6, 200.0, 0.8).unwrap_err();
        assert!(matches!(err, CoreError::UnstableGrid { .. }));

        // Overflowing step counts are refused too, not looped over.
        let err = SimulationGrid::stable_substeps(20, 1e300, 200.0, 0.8).unwrap_err();
        assert!(matches!(err, CoreError::UnstableGrid { .. }));

        let err = SimulationGrid::stable_substeps(20, 0.1, f64::INFINITY, 0.8).unwrap_err();
        assert!(matches!(err, CoreError::InvalidParameter { name: "kappa_max", .. }));
    }

    #[test]
    fn validate_caps_substeps() {
        assert!(grid(11, 5, 0.1, MAX_SUBSTEPS).validate().is_ok());
        assert!(matches!(
            grid(11, 5, 0.1, MAX_SUBSTEPS + 1).validate(),
            Err(CoreError::InvalidParameter { name: "substeps", .. })
        ));
    }
}
