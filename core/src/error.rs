//! Error taxonomy for the optctl engine.

use thiserror::Error;

/// Result type for optctl operations.
pub type Result<T> = std::result::Result<T, OptctlError>;

/// Fatal and non-fatal error variants produced anywhere in the engine.
///
/// `SolverNonConvergence` and `Numerical` are the two non-fatal kinds:
/// callers collect them into a [`crate::context::Diagnostics`] counter
/// instead of aborting, 
#[derive(Error, Debug)]
pub enum OptctlError {
    /// Key missing, inconsistent dimensions, or unknown enum value in the
    /// configuration file. Fatal; `key` points at the offending key.
    #[error("configuration error at key '{key}': {message}")]
    Config { key: String, message: String },

    /// File open failed or a short read occurred. Fatal.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Linear solver did not converge within `linsolve_maxiter`. Non-fatal;
    /// the step proceeds with its best-effort iterate.
    #[error("linear solver did not converge at step {step}: residual {residual:e}")]
    SolverNonConvergence { step: usize, residual: f64 },

    /// State trace drift or Hermiticity violation beyond tolerance.
    /// Non-fatal; printed and recorded for inspection.
    #[error("numerical warning: {0}")]
    Numerical(String),

    /// Parameter vector length mismatch or state dimension mismatch.
    /// Fatal, caught as early as possible.
    #[error("shape error: {0}")]
    Shape(String),

    /// A control basis does not support the requested operation (e.g. the
    /// derivative of a `Step` basis, which is non-differentiable).
    #[error("control basis error: {0}")]
    ControlBasis(String),
}

impl OptctlError {
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config { key: key.into(), message: message.into() }
    }

    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape(message.into())
    }

    pub fn control_basis(message: impl Into<String>) -> Self {
        Self::ControlBasis(message.into())
    }

    /// True for errors that a caller may log and continue past rather than
    /// abort the process for.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SolverNonConvergence { .. } | Self::Numerical(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_the_key() {
        let err = OptctlError::config("nlevels", "expected a list of ints");
        assert!(err.to_string().contains("nlevels"));
    }

    #[test]
    fn solver_nonconvergence_is_recoverable() {
        let err = OptctlError::SolverNonConvergence { step: 3, residual: 1e-4 };
        assert!(err.is_recoverable());
    }

    #[test]
    fn shape_error_is_not_recoverable() {
        let err = OptctlError::shape("expected length 80, got 64");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: OptctlError = io_err.into();
        assert!(matches!(err, OptctlError::Io(_)));
    }
}
