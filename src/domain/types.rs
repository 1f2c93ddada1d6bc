//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - handed to external plotting/aggregation tools unchanged

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use nalgebra::DMatrix;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// Identifier of one experimental trial (e.g. `HFC1`: high flow, cooled, trial 1).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrialId(pub String);

impl TrialId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Measured saturation fractions, rows = time frames, columns = spatial bins.
///
/// The spatial axis is uniform over `Z ∈ [0, 1]`: column `j` of `n` sits at
/// `Z = j / (n - 1)`. Missing cells are NaN. The matrix is never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SaturationField {
    values: DMatrix<f64>,
}

impl SaturationField {
    pub fn new(values: DMatrix<f64>) -> Self {
        Self { values }
    }

    /// Build a field from row-major frames.
    ///
    /// Returns `None` for an empty input or ragged rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let n_positions = rows.first()?.len();
        if n_positions == 0 || rows.iter().any(|r| r.len() != n_positions) {
            return None;
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Some(Self::new(DMatrix::from_row_slice(rows.len(), n_positions, &flat)))
    }

    pub fn n_frames(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_positions(&self) -> usize {
        self.values.ncols()
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn get(&self, frame: usize, position: usize) -> f64 {
        self.values[(frame, position)]
    }

    /// Saturation samples of one time frame, inlet first.
    pub fn frame(&self, frame: usize) -> impl Iterator<Item = f64> + '_ {
        (0..self.n_positions()).map(move |j| self.values[(frame, j)])
    }

    /// Dimensionless position of each spatial column.
    pub fn z_positions(&self) -> Vec<f64> {
        z_positions(self.n_positions())
    }

    /// Number of finite (non-missing) cells.
    pub fn finite_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_finite()).count()
    }
}

/// Uniform positions `j / (n - 1)` over `[0, 1]`.
pub fn z_positions(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n).map(|j| j as f64 / (n as f64 - 1.0)).collect(),
    }
}

/// Per-trial physical parameters supplied by the ingestion side.
///
/// Only `frame_interval` and `tau_scale` enter the numerics (through
/// [`TrialParameters::frame_dtau`]); the rest is validated and carried into
/// exports so downstream tools see one self-contained record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialParameters {
    pub bed_height: f64,
    pub bed_volume: f64,
    pub bed_diameter: f64,
    pub flow_rate: f64,
    pub porosity: f64,
    /// Real time between saturation frames.
    pub frame_interval: f64,
    /// Real time -> dimensionless tau factor.
    pub tau_scale: f64,
}

impl TrialParameters {
    /// Parameters for data whose frames are already one tau unit `frame_dtau` apart.
    pub fn dimensionless(frame_dtau: f64) -> Self {
        Self {
            bed_height: 1.0,
            bed_volume: 1.0,
            bed_diameter: 1.0,
            flow_rate: 1.0,
            porosity: 1.0,
            frame_interval: frame_dtau,
            tau_scale: 1.0,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let positive = [
            ("bed_height", self.bed_height),
            ("bed_volume", self.bed_volume),
            ("bed_diameter", self.bed_diameter),
            ("flow_rate", self.flow_rate),
            ("frame_interval", self.frame_interval),
            ("tau_scale", self.tau_scale),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(CoreError::invalid(name, value, "must be finite and > 0"));
            }
        }
        if !(self.porosity.is_finite() && self.porosity > 0.0 && self.porosity <= 1.0) {
            return Err(CoreError::invalid("porosity", self.porosity, "must lie in (0, 1]"));
        }
        Ok(())
    }

    /// Dimensionless time between consecutive frames.
    pub fn frame_dtau(&self) -> f64 {
        self.frame_interval * self.tau_scale
    }

    /// Dimensionless time of each frame, starting at `tau = 0`.
    pub fn tau_axis(&self, n_frames: usize) -> Vec<f64> {
        let dtau = self.frame_dtau();
        (0..n_frames).map(|i| i as f64 * dtau).collect()
    }
}

/// Front position per frame. `z[i] == None` marks a frame without a valid crossing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontSeries {
    pub tau: Vec<f64>,
    pub z: Vec<Option<f64>>,
}

impl FrontSeries {
    pub fn len(&self) -> usize {
        self.z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.z.iter().filter(|z| z.is_none()).count()
    }

    /// `(tau, Z)` pairs of frames that have a front.
    pub fn valid_pairs(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.tau
            .iter()
            .zip(self.z.iter())
            .filter_map(|(&t, z)| z.map(|z| (t, z)))
    }
}

/// Calibrated parameters of one trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub psi: f64,
    pub kappa: f64,
    /// Non-finite values are written as `"inf"`, `"-inf"` or `"nan"`.
    #[serde(serialize_with = "serialize_float", deserialize_with = "deserialize_float")]
    pub residual: f64,
    pub converged: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_float<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else if value.is_nan() {
        serializer.serialize_str("nan")
    } else if *value > 0.0 {
        serializer.serialize_str("inf")
    } else {
        serializer.serialize_str("-inf")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FloatRepr {
    Number(f64),
    Label(String),
}

fn deserialize_float<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match FloatRepr::deserialize(deserializer)? {
        FloatRepr::Number(value) => Ok(value),
        FloatRepr::Label(label) => match label.as_str() {
            "inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            "nan" => Ok(f64::NAN),
            other => Err(serde::de::Error::custom(format!("Failed to parse float: '{other}'"))),
        },
    }
}

/// Residual objective used by the kappa fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResidualMetric {
    /// Sum of squared residuals over finite measured cells.
    #[default]
    Sse,
    /// Mean of squared residuals over finite measured cells.
    Mse,
}

impl ResidualMetric {
    pub fn finish(self, sum_sq: f64, n: usize) -> f64 {
        match self {
            ResidualMetric::Sse => sum_sq,
            ResidualMetric::Mse => sum_sq / n.max(1) as f64,
        }
    }
}

/// Uniform state of the bed at `tau = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialCondition {
    pub gas: f64,
    pub solid: f64,
}

impl InitialCondition {
    /// Clean bed: no vapor in either phase.
    pub fn clean_bed() -> Self {
        Self { gas: 0.0, solid: 0.0 }
    }
}

impl Default for InitialCondition {
    fn default() -> Self {
        Self::clean_bed()
    }
}

/// Gas-phase saturation held at the inlet (`Z = 0`) for all tau.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InletBoundary {
    pub gas: f64,
}

impl Default for InletBoundary {
    fn default() -> Self {
        Self { gas: 1.0 }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Saturation fraction that defines the front.
    pub threshold: f64,

    pub kappa_guess: f64,
    /// Upper end of the kappa search (also capped by the grid's stability ceiling).
    pub kappa_max: f64,
    /// Seed grid size for the kappa search.
    pub kappa_seed_points: usize,
    /// Golden-section iteration budget.
    pub max_iters: usize,
    /// Optional wall-clock budget for one kappa fit.
    pub time_budget: Option<Duration>,
    pub x_abs_tol: f64,
    pub x_rel_tol: f64,
    pub metric: ResidualMetric,

    /// Explicit solver steps per frame. `None` picks the smallest stable count
    /// for `kappa_max`.
    pub substeps: Option<usize>,
    pub initial: InitialCondition,
    pub inlet: InletBoundary,

    pub export_results: Option<PathBuf>,
    pub export_json: Option<PathBuf>,
    pub export_front: Option<PathBuf>,
    pub debug: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            kappa_guess: 1.0,
            kappa_max: 200.0,
            kappa_seed_points: 25,
            max_iters: 100,
            time_budget: None,
            x_abs_tol: 1e-9,
            x_rel_tol: 1e-7,
            metric: ResidualMetric::Sse,
            substeps: None,
            initial: InitialCondition::clean_bed(),
            inlet: InletBoundary::default(),
            export_results: None,
            export_json: None,
            export_front: None,
            debug: false,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.threshold.is_finite() && self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(CoreError::invalid("threshold", self.threshold, "must lie in (0, 1)"));
        }
        if !(self.kappa_guess.is_finite() && self.kappa_guess > 0.0) {
            return Err(CoreError::invalid("kappa_guess", self.kappa_guess, "must be finite and > 0"));
        }
        if !(self.kappa_max.is_finite() && self.kappa_max > 0.0) {
            return Err(CoreError::invalid("kappa_max", self.kappa_max, "must be finite and > 0"));
        }
        for (name, value) in [("x_abs_tol", self.x_abs_tol), ("x_rel_tol", self.x_rel_tol)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(CoreError::invalid(name, value, "must be finite and >= 0"));
            }
        }
        if self.kappa_seed_points < 3 {
            return Err(CoreError::invalid(
                "kappa_seed_points",
                self.kappa_seed_points as f64,
                "must be >= 3",
            ));
        }
        if self.substeps == Some(0) {
            return Err(CoreError::invalid("substeps", 0.0, "must be >= 1"));
        }
        Ok(())
    }
}
