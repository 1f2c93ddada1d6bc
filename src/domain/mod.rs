//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - measured inputs (`SaturationField`, `TrialParameters`, `TrialId`)
//! - derived series and fit outputs (`FrontSeries`, `FitResult`)
//! - solver conditions and run configuration (`InitialCondition`, `FitConfig`, ...)

pub mod types;

pub use types::*;
