//! # Risk Model
//!
//! $$
//! (\mu,\Sigma)=\begin{cases}(\hat\mu,\hat\Sigma+\varepsilon I)&\text{sample}\\
//! (\mu_{BL},\Sigma_{BL})&\text{Black-Litterman}\end{cases}
//! $$
//!
//! Expected returns and covariance for the optimizer.

pub mod black_litterman;
pub mod linalg;
pub mod sample;

use nalgebra::DMatrix;
use nalgebra::DVector;

pub use black_litterman::BlackLitterman;
pub use black_litterman::Posterior;
pub use black_litterman::View;
pub use black_litterman::ViewMatrix;
pub use linalg::regularize;
pub use sample::sample_moments;

use crate::data::ReturnPanel;
use crate::error::Result;

/// Annualized moments of a set of assets.
#[derive(Clone, Debug)]
pub struct MarketMoments {
  pub tickers: Vec<String>,
  pub mu: DVector<f64>,
  pub cov: DMatrix<f64>,
  /// Diagonal ridge applied to the sample covariance.
  pub ridge: f64,
}

impl MarketMoments {
  pub fn n_assets(&self) -> usize {
    self.mu.len()
  }

  /// Annualized volatility of each asset held alone.
  pub fn asset_volatilities(&self) -> Vec<f64> {
    (0..self.n_assets())
      .map(|i| self.cov[(i, i)].max(0.0).sqrt())
      .collect()
  }
}

/// Estimates [`MarketMoments`] from a return panel.
#[derive(Clone, Copy, Debug)]
pub struct RiskModel {
  pub periods_per_year: f64,
  pub condition_limit: f64,
  pub ridge_scale: f64,
}

impl Default for RiskModel {
  fn default() -> Self {
    Self {
      periods_per_year: 252.0,
      condition_limit: 1e8,
      ridge_scale: 1e-6,
    }
  }
}

impl RiskModel {
  /// Sample mean and (regularized) sample covariance.
  pub fn sample(&self, panel: &ReturnPanel) -> Result<MarketMoments> {
    let (mu, cov) = sample_moments(panel, self.periods_per_year)?;
    let reg = regularize(cov, self.condition_limit, self.ridge_scale)?;

    Ok(MarketMoments {
      tickers: panel.tickers().to_vec(),
      mu,
      cov: reg.cov,
      ridge: reg.ridge,
    })
  }

  /// Black-Litterman posterior using `w_market` as the market portfolio proxy.
  pub fn black_litterman(
    &self,
    panel: &ReturnPanel,
    model: &BlackLitterman,
    w_market: &[f64],
    views: Option<&ViewMatrix>,
  ) -> Result<MarketMoments> {
    let sample = self.sample(panel)?;
    let w = DVector::from_column_slice(w_market);
    let post = model.posterior(&sample.mu, &sample.cov, &w, views)?;
    let reg = regularize(post.cov, self.condition_limit, self.ridge_scale)?;

    Ok(MarketMoments {
      tickers: sample.tickers,
      mu: post.mu,
      cov: reg.cov,
      ridge: sample.ridge + reg.ridge,
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::Array2;

  use super::*;
  use crate::testing::business_days;
  use crate::testing::date;

  fn panel(returns: &[Vec<f64>]) -> ReturnPanel {
    let t = returns[0].len();
    let n = returns.len();
    let m = Array2::from_shape_fn((t, n), |(i, j)| returns[j][i]);
    let tickers = (0..n).map(|i| format!("T{i}")).collect();
    ReturnPanel::new(tickers, business_days(date(2024, 1, 1), t + 1), m).unwrap()
  }

  #[test]
  fn duplicated_asset_is_regularized() {
    let a = vec![0.01, -0.02, 0.015, 0.0, 0.005, -0.01];
    let model = RiskModel::default();
    let moments = model.sample(&panel(&[a.clone(), a])).unwrap();
    assert!(moments.ridge > 0.0);
    assert!(moments.cov.clone().cholesky().is_some());
  }

  #[test]
  fn black_litterman_without_views_keeps_prior() {
    let p = panel(&[
      vec![0.01, -0.02, 0.015, 0.0, 0.005, -0.01, 0.02],
      vec![0.0, 0.01, -0.01, 0.02, -0.005, 0.0, 0.01],
    ]);
    let model = RiskModel::default();
    let bl = BlackLitterman::default();
    let moments = model.black_litterman(&p, &bl, &[0.6, 0.4], None).unwrap();

    let sample = model.sample(&p).unwrap();
    let w = DVector::from_column_slice(&[0.6, 0.4]);
    let delta = bl.implied_risk_aversion(&sample.mu, &sample.cov, &w);
    let prior = &sample.cov * &w * delta;
    assert_abs_diff_eq!(moments.mu[0], prior[0], epsilon = 1e-10);
    assert_abs_diff_eq!(moments.mu[1], prior[1], epsilon = 1e-10);
  }
}
