//! # Engine Configuration
//!
//! $$
//! \mu=\bar r\cdot P,\qquad \Sigma=\widehat{\operatorname{Cov}}(r)\cdot P,\qquad P=\text{periods per year}
//! $$
//!
//! Tunables shared by all requests. Everything here is immutable once an
//! [`Engine`](crate::engine::Engine) is built.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Settings of the ADMM quadratic-program solver.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QpSettings {
  /// Initial penalty parameter for inequality rows.
  pub rho: f64,
  /// Multiplier applied to `rho` on equality rows.
  pub rho_eq_scale: f64,
  /// Proximal regularization of the primal update.
  pub sigma: f64,
  /// Over-relaxation factor in (0, 2).
  pub alpha: f64,
  /// Absolute residual tolerance.
  pub eps_abs: f64,
  /// Relative residual tolerance.
  pub eps_rel: f64,
  /// Iteration cap.
  pub max_iter: usize,
  /// Iterations between adaptive `rho` updates.
  pub adaptive_rho_interval: usize,
}

impl Default for QpSettings {
  fn default() -> Self {
    Self {
      rho: 0.1,
      rho_eq_scale: 1e3,
      sigma: 1e-6,
      alpha: 1.6,
      eps_abs: 1e-9,
      eps_rel: 1e-9,
      max_iter: 20_000,
      adaptive_rho_interval: 50,
    }
  }
}

/// Runtime configuration for [`Engine`](crate::engine::Engine).
///
/// Deserializes from camelCase JSON; missing fields keep their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
  /// Annualization factor for returns and covariances.
  pub periods_per_year: f64,
  /// Minimum share of the requested range the common calendar must keep.
  pub min_coverage: f64,
  /// Black-Litterman prior uncertainty scale.
  pub tau: f64,
  /// Black-Litterman risk aversion; derived from the market portfolio when `None`.
  pub risk_aversion: Option<f64>,
  /// Risk aversion used when the derived one is not usable.
  pub fallback_risk_aversion: f64,
  /// Risk-free rate used by optimize requests that do not carry one.
  pub risk_free_rate: f64,
  /// Number of target returns sampled along the efficient frontier.
  pub frontier_points: usize,
  /// Exponent of the risk-parity multiplicative update.
  pub risk_parity_damping: f64,
  /// Risk-contribution tolerance of the risk-parity iteration.
  pub risk_parity_tolerance: f64,
  /// Iteration cap of the risk-parity iteration.
  pub risk_parity_max_iter: usize,
  /// Covariance condition number above which a ridge is added.
  pub condition_limit: f64,
  /// Ridge size as a fraction of the average variance.
  pub ridge_scale: f64,
  /// Default optimize lookback in calendar days.
  pub lookback_days: i64,
  /// Relative tolerance of the risk-target bisection.
  pub bisection_tolerance: f64,
  /// Iteration cap of the risk-target bisection.
  pub bisection_max_iter: usize,
  /// Quadratic-program solver settings.
  pub qp: QpSettings,
  /// Per-request wall-clock budget.
  pub timeout: Option<Duration>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      periods_per_year: 252.0,
      min_coverage: 0.6,
      tau: 0.05,
      risk_aversion: None,
      fallback_risk_aversion: 2.5,
      risk_free_rate: 0.06,
      frontier_points: 50,
      risk_parity_damping: 0.5,
      risk_parity_tolerance: 1e-6,
      risk_parity_max_iter: 500,
      condition_limit: 1e8,
      ridge_scale: 1e-6,
      lookback_days: 730,
      bisection_tolerance: 1e-10,
      bisection_max_iter: 200,
      qp: QpSettings::default(),
      timeout: None,
    }
  }
}

impl EngineConfig {
  /// Same configuration with a per-request timeout.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_json_keeps_defaults() {
    let config: EngineConfig =
      serde_json::from_str(r#"{"frontierPoints": 12, "qp": {"maxIter": 500}, "timeout": {"secs": 2, "nanos": 0}}"#)
        .unwrap();

    assert_eq!(config.frontier_points, 12);
    assert_eq!(config.qp.max_iter, 500);
    assert_eq!(config.qp.rho, QpSettings::default().rho);
    assert_eq!(config.timeout, Some(Duration::from_secs(2)));
    assert_eq!(config.min_coverage, 0.6);
    assert_eq!(config.risk_free_rate, 0.06);
  }
}
