//! Input/output helpers.
//!
//! - saturation matrix + trial manifest ingest (`ingest`)
//! - result and front exports (CSV) (`export`)
//! - fit JSON read/write (`fit_json`)

pub mod export;
pub mod fit_json;
pub mod ingest;

pub use export::*;
pub use fit_json::*;
pub use ingest::*;
