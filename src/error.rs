//! Error types.
//!
//! Two layers:
//!
//! - [`CoreError`]: typed failures of the numerical core (front extraction,
//!   slope fit, transport solver, kappa fit). These never abort a batch; the
//!   pipeline attaches the trial identity and moves on.
//! - [`AppError`]: what the binary reports, carrying a process exit code.
//!
//! A fit that runs out of iterations is *not* an error; see
//! [`crate::domain::FitResult::converged`].

use thiserror::Error;

/// Failures of the numerical core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Not enough valid samples to estimate a parameter.
    #[error("insufficient data: {what} (have {have}, need at least {need})")]
    InsufficientData {
        what: &'static str,
        have: usize,
        need: usize,
    },

    /// The finite-difference step sizes break the stability bound.
    #[error(
        "unstable grid: courant={courant:.4} + exchange={exchange:.4} must be <= 1 \
         and uptake={uptake:.4} must be <= 1 (dtau={dtau:.3e}, dz={dz:.3e})"
    )]
    UnstableGrid {
        /// `dtau / dz`
        courant: f64,
        /// `dtau * kappa`
        exchange: f64,
        /// `dtau * psi * kappa`
        uptake: f64,
        dtau: f64,
        dz: f64,
    },

    /// A negative, non-finite or otherwise meaningless parameter reached a
    /// solver entry point.
    #[error("invalid parameter {name}={value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

impl CoreError {
    pub(crate) fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
        CoreError::InvalidParameter { name, value, reason }
    }

    /// Exit code used when this error ends a CLI run.
    pub fn exit_code(&self) -> u8 {
        match self {
            CoreError::InvalidParameter { .. } => 2,
            CoreError::InsufficientData { .. } => 3,
            CoreError::UnstableGrid { .. } => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
