//! # Optimizer
//!
//! $$
//! \mathbf{w}^\*=\arg\min_{\mathbf{w}\in\mathcal W}\ \mathbf{w}^\top\Sigma\mathbf{w}
//! \quad\text{or}\quad RC_i(\mathbf{w}^\*)=b_i
//! $$
//!
//! Target weights from market moments under an objective and constraints.

pub mod feasible;
pub mod frontier;
pub mod mean_variance;
pub mod qp;
pub mod risk_parity;
pub mod scatter;

use nalgebra::DVector;

pub use feasible::FeasibleSet;
pub use frontier::FrontierSampler;
pub use mean_variance::MeanVariance;
pub use qp::QpProblem;
pub use qp::QpSolution;
pub use risk_parity::risk_contributions;
pub use risk_parity::RiskParity;
pub use scatter::random_portfolios;

use crate::config::EngineConfig;
use crate::config::QpSettings;
use crate::deadline::Deadline;
use crate::error::EngineError;
use crate::error::Result;
use crate::risk::linalg::quad_form;
use crate::risk::MarketMoments;
use crate::types::Objective;

/// Output of a portfolio optimization run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortfolioResult {
  /// Final portfolio weights, summing to one.
  pub weights: Vec<f64>,
  /// Model expected portfolio return (annualized).
  pub expected_return: f64,
  /// Model portfolio volatility.
  pub volatility: f64,
  /// Sharpe ratio computed as `(expected_return - risk_free) / volatility`.
  pub sharpe: f64,
}

impl PortfolioResult {
  /// Score `w` against `moments`.
  pub fn evaluate(w: &DVector<f64>, moments: &MarketMoments, risk_free: f64) -> Self {
    let expected_return = moments.mu.dot(w);
    let volatility = quad_form(w, &moments.cov).max(0.0).sqrt();
    let sharpe = if volatility > 1e-15 {
      (expected_return - risk_free) / volatility
    } else {
      0.0
    };

    Self {
      weights: w.iter().copied().collect(),
      expected_return,
      volatility,
      sharpe,
    }
  }
}

/// Solver settings for one engine.
#[derive(Clone, Copy, Debug)]
pub struct Optimizer {
  pub qp: QpSettings,
  pub bisection_tolerance: f64,
  pub bisection_max_iter: usize,
  pub risk_parity: RiskParity,
  pub frontier: FrontierSampler,
}

impl Default for Optimizer {
  fn default() -> Self {
    Self::from_config(&EngineConfig::default())
  }
}

impl Optimizer {
  pub fn from_config(config: &EngineConfig) -> Self {
    Self {
      qp: config.qp,
      bisection_tolerance: config.bisection_tolerance,
      bisection_max_iter: config.bisection_max_iter,
      risk_parity: RiskParity {
        damping: config.risk_parity_damping,
        tolerance: config.risk_parity_tolerance,
        max_iter: config.risk_parity_max_iter,
      },
      frontier: FrontierSampler {
        points: config.frontier_points,
      },
    }
  }

  /// Mean-variance solver over `moments` and `set`.
  pub fn mean_variance<'a>(
    &self,
    moments: &'a MarketMoments,
    set: &'a FeasibleSet,
    deadline: Deadline,
  ) -> MeanVariance<'a> {
    MeanVariance::new(
      moments,
      set,
      self.qp,
      deadline,
      self.bisection_tolerance,
      self.bisection_max_iter,
    )
  }

  /// Mean-variance portfolio for `objective`.
  ///
  /// `target_value` is an annualized return for [`Objective::Return`] and an
  /// annualized volatility for [`Objective::Risk`].
  pub fn optimize(
    &self,
    mv: &MeanVariance<'_>,
    objective: Objective,
    target_value: Option<f64>,
    risk_free: f64,
  ) -> Result<PortfolioResult> {
    let target = || {
      target_value.ok_or_else(|| {
        EngineError::InvalidInput(format!("objective {objective:?} requires a target value"))
      })
    };

    let w = match objective {
      Objective::Sharpe => mv.max_sharpe(risk_free)?,
      Objective::Variance => mv.min_variance()?,
      Objective::Return => mv.efficient_return(target()?)?,
      Objective::Risk => mv.efficient_risk(target()?)?,
    };

    Ok(PortfolioResult::evaluate(&w, mv.moments(), risk_free))
  }

  /// Risk-parity portfolio over the long side of `set`.
  pub fn risk_parity(
    &self,
    moments: &MarketMoments,
    set: &FeasibleSet,
    budget: Option<&[f64]>,
    risk_free: f64,
    deadline: &Deadline,
  ) -> Result<PortfolioResult> {
    let long_side = FeasibleSet::boxed(
      set.lower.iter().map(|l| l.max(0.0)).collect(),
      set.upper.clone(),
    )?;
    let w = self
      .risk_parity
      .solve(&moments.cov, budget, &long_side, deadline)?;

    let breach = set.max_violation(&w);
    if breach > 1e-6 {
      return Err(EngineError::ConstraintInfeasible(format!(
        "risk-parity weights exceed a sector limit by {breach:.6}"
      )));
    }
    Ok(PortfolioResult::evaluate(&w, moments, risk_free))
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use nalgebra::DMatrix;

  use super::*;
  use crate::types::Constraints;

  fn moments() -> MarketMoments {
    MarketMoments {
      tickers: vec!["A".into(), "B".into(), "C".into()],
      mu: DVector::from_column_slice(&[0.07, 0.11, 0.13]),
      cov: DMatrix::from_row_slice(
        3,
        3,
        &[
          0.03, 0.006, 0.003, //
          0.006, 0.06, 0.015, //
          0.003, 0.015, 0.10,
        ],
      ),
      ridge: 0.0,
    }
  }

  #[test]
  fn every_objective_returns_valid_weights() {
    let m = moments();
    let c = Constraints::new(0.6, None, None, true).unwrap();
    let set = FeasibleSet::new(&c, &vec![None; 3]).unwrap();
    let opt = Optimizer::default();
    let mv = opt.mean_variance(&m, &set, Deadline::unbounded());

    let cases = [
      (Objective::Sharpe, None),
      (Objective::Variance, None),
      (Objective::Return, Some(0.1)),
      (Objective::Risk, Some(0.2)),
    ];
    for (objective, target) in cases {
      let r = opt.optimize(&mv, objective, target, 0.02).unwrap();
      assert_abs_diff_eq!(r.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
      assert!(r.weights.iter().all(|&w| (-1e-6..=0.6 + 1e-6).contains(&w)));
      assert_abs_diff_eq!(r.sharpe, (r.expected_return - 0.02) / r.volatility, epsilon = 1e-12);
    }
  }

  #[test]
  fn target_objectives_need_a_value() {
    let m = moments();
    let set = FeasibleSet::new(&Constraints::default(), &vec![None; 3]).unwrap();
    let opt = Optimizer::default();
    let mv = opt.mean_variance(&m, &set, Deadline::unbounded());
    let err = opt.optimize(&mv, Objective::Return, None, 0.0).unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
  }

  #[test]
  fn risk_parity_respects_sector_limit_or_fails() {
    let m = moments();
    let c = Constraints::new(1.0, None, Some(0.5), true).unwrap();
    let sectors = vec![Some("x".to_string()), Some("x".to_string()), Some("y".to_string())];
    let set = FeasibleSet::new(&c, &sectors).unwrap();
    let err = Optimizer::default()
      .risk_parity(&m, &set, None, 0.0, &Deadline::unbounded())
      .unwrap_err();
    assert!(matches!(err, EngineError::ConstraintInfeasible(_)));
  }

  #[test]
  fn zero_volatility_reports_zero_sharpe() {
    let m = MarketMoments {
      tickers: vec!["CASH".into()],
      mu: DVector::from_column_slice(&[0.01]),
      cov: DMatrix::zeros(1, 1),
      ridge: 0.0,
    };
    let r = PortfolioResult::evaluate(&DVector::from_column_slice(&[1.0]), &m, 0.0);
    assert_eq!(r.sharpe, 0.0);
  }
}
