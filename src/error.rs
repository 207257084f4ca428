//! # Errors
//!
//! $$
//! \text{request}\to\mathbf{w}^\*\ \big|\ \text{NAV}_{0..T}\quad\text{or}\quad\bot
//! $$
//!
//! Every failure is terminal for the request that raised it.

use thiserror::Error;

/// Failure taxonomy of the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
  /// Insufficient or misaligned price history.
  #[error("data error: {0}")]
  Data(String),

  /// No weight vector satisfies the constraints.
  #[error("constraints are infeasible: {0}")]
  ConstraintInfeasible(String),

  /// An iterative solver exceeded its iteration cap.
  #[error("no convergence after {iterations} iterations (residual {residual:.3e})")]
  Convergence { iterations: usize, residual: f64 },

  /// Covariance singular beyond regularization tolerance.
  #[error("numerical error: {0}")]
  Numerical(String),

  /// Malformed request (unknown ticker in a view, missing target value, ...).
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// The caller-imposed deadline expired.
  #[error("request timed out after {elapsed_ms} ms")]
  Timeout { elapsed_ms: u128 },
}

impl EngineError {
  /// Short machine-readable tag, used by the CLI for tagged error output.
  pub fn kind(&self) -> &'static str {
    match self {
      EngineError::Data(_) => "DataError",
      EngineError::ConstraintInfeasible(_) => "ConstraintInfeasibleError",
      EngineError::Convergence { .. } => "ConvergenceError",
      EngineError::Numerical(_) => "NumericalError",
      EngineError::InvalidInput(_) => "InvalidInputError",
      EngineError::Timeout { .. } => "TimeoutError",
    }
  }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kinds_match_dashboard_tags() {
    assert_eq!(EngineError::Data("x".into()).kind(), "DataError");
    assert_eq!(
      EngineError::Convergence {
        iterations: 500,
        residual: 1e-3
      }
      .kind(),
      "ConvergenceError"
    );
    assert_eq!(
      EngineError::ConstraintInfeasible("x".into()).to_string(),
      "constraints are infeasible: x"
    );
  }
}
