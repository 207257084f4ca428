//! # Sample Moments
//!
//! $$
//! \hat\mu=P\,\bar r,\qquad \hat\Sigma=\frac{P}{T-1}\sum_t (r_t-\bar r)(r_t-\bar r)^\top
//! $$
//!

use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;

use crate::data::ReturnPanel;
use crate::error::EngineError;
use crate::error::Result;

/// Annualized sample mean vector and covariance (ddof = 1).
pub fn sample_moments(panel: &ReturnPanel, periods_per_year: f64) -> Result<(DVector<f64>, DMatrix<f64>)> {
  if panel.n_periods() < 2 {
    return Err(EngineError::Data(format!(
      "{} return periods are not enough to estimate a covariance",
      panel.n_periods()
    )));
  }

  let returns = panel.returns();
  let mean = returns
    .mean_axis(Axis(0))
    .ok_or_else(|| EngineError::Data("empty return panel".into()))?;
  let cov = returns
    .t()
    .cov(1.0)
    .map_err(|_| EngineError::Data("empty return panel".into()))?;

  let n = panel.n_assets();
  let mu = DVector::from_iterator(n, mean.iter().map(|m| m * periods_per_year));
  let sigma = DMatrix::from_fn(n, n, |i, j| cov[(i, j)] * periods_per_year);

  Ok((mu, sigma))
}
