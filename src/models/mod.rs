//! Transport model of the packed column.
//!
//! The solver is a pure function of its inputs so the kappa search can call it
//! repeatedly (and in parallel) without any shared state.

pub mod transport;

pub use transport::*;
