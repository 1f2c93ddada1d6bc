//! Breakthrough-front extraction from saturation fields.

pub mod extract;

pub use extract::*;
