//! Mathematical utilities: SVD least squares and polynomial fits.

pub mod ols;

pub use ols::*;
