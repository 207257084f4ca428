//! Dense linear-algebra helpers on nalgebra types.

use nalgebra::DMatrix;
use nalgebra::DVector;
use nalgebra::SymmetricEigen;

use crate::error::EngineError;
use crate::error::Result;

pub fn dvector(xs: &[f64]) -> DVector<f64> {
  DVector::from_column_slice(xs)
}

pub fn dmatrix(rows: &[Vec<f64>]) -> DMatrix<f64> {
  let n = rows.len();
  let m = rows.first().map(|r| r.len()).unwrap_or(0);
  DMatrix::from_fn(n, m, |i, j| rows[i].get(j).copied().unwrap_or(0.0))
}

/// `wᵀ Σ w`.
pub fn quad_form(w: &DVector<f64>, cov: &DMatrix<f64>) -> f64 {
  (w.transpose() * cov * w)[(0, 0)]
}

/// Inverse of a symmetric positive-definite matrix via Cholesky.
pub fn inverse_spd(m: &DMatrix<f64>, what: &str) -> Result<DMatrix<f64>> {
  m.clone()
    .cholesky()
    .map(|c| c.inverse())
    .ok_or_else(|| EngineError::Numerical(format!("{what} is not positive definite")))
}

/// Extreme eigenvalues of a symmetric matrix.
pub fn eigen_range(m: &DMatrix<f64>) -> (f64, f64) {
  let eig = SymmetricEigen::new(m.clone());
  let min = eig.eigenvalues.iter().copied().fold(f64::INFINITY, f64::min);
  let max = eig.eigenvalues.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  (min, max)
}

/// Condition number of a symmetric matrix; infinite when not positive definite.
pub fn condition_number(m: &DMatrix<f64>) -> f64 {
  let (min, max) = eigen_range(m);
  if min <= 0.0 || !min.is_finite() {
    f64::INFINITY
  } else {
    max / min
  }
}

/// Covariance after an optional ridge `εI`.
#[derive(Clone, Debug)]
pub struct Regularized {
  pub cov: DMatrix<f64>,
  /// Ridge added to the diagonal, zero when none was needed.
  pub ridge: f64,
}

/// Add `ε I` with `ε = ridge_scale · tr(Σ)/n` when `Σ` is singular or its
/// condition number exceeds `condition_limit`.
pub fn regularize(cov: DMatrix<f64>, condition_limit: f64, ridge_scale: f64) -> Result<Regularized> {
  let n = cov.nrows();
  if n == 0 || n != cov.ncols() {
    return Err(EngineError::Numerical(format!(
      "covariance must be square and non-empty, got {}x{}",
      cov.nrows(),
      cov.ncols()
    )));
  }
  if cov.iter().any(|v| !v.is_finite()) {
    return Err(EngineError::Numerical("covariance contains NaN or Inf".into()));
  }

  let cond = condition_number(&cov);
  let mut out = Regularized { cov, ridge: 0.0 };

  if cond > condition_limit {
    let eps = ridge_scale * out.cov.trace() / n as f64;
    if eps.is_nan() || eps <= 0.0 {
      return Err(EngineError::Numerical(
        "covariance has zero trace, cannot regularize".into(),
      ));
    }
    for i in 0..n {
      out.cov[(i, i)] += eps;
    }
    out.ridge = eps;
    tracing::warn!(condition = cond, ridge = eps, "covariance ill-conditioned, ridge added");
  }

  if out.cov.clone().cholesky().is_none() {
    return Err(EngineError::Numerical(
      "covariance is singular after regularization".into(),
    ));
  }

  Ok(out)
}
