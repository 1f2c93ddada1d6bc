//! `adsorb-fit` library crate.
//!
//! The binary (`adsorb`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the numerical engine (front extraction, slope fit, transport solver,
//!   kappa fit) can be driven from other tools
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod debug;
pub mod domain;
pub mod error;
pub mod fit;
pub mod front;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
