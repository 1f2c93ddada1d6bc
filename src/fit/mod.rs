//! Parameter calibration.
//!
//! Responsibilities:
//!
//! - psi: least-squares slope of the front position against tau
//! - kappa: residual minimization against the transport model
//!   (log-spaced seed scan in parallel, then golden-section refinement)

pub mod golden;
pub mod kappa;
pub mod kappa_grid;
pub mod slope;

pub use kappa::*;
pub use kappa_grid::*;
pub use slope::*;
