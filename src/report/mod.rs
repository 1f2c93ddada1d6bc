//! Reporting utilities: trial summaries and batch tables.

pub mod format;

pub use format::*;
