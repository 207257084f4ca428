//! # Mean-Variance
//!
//! $$
//! \min_{w\in\mathcal W}\ w^\top\Sigma w\quad\text{s.t.}\quad \mu^\top w=r^\*
//! $$
//!
//! Minimum-variance, target-return, target-risk and tangency portfolios on a
//! fixed set of moments and constraints.

use nalgebra::DMatrix;
use nalgebra::DVector;

use super::feasible::FeasibleSet;
use super::qp::QpProblem;
use crate::config::QpSettings;
use crate::deadline::Deadline;
use crate::error::EngineError;
use crate::error::Result;
use crate::risk::linalg::inverse_spd;
use crate::risk::linalg::quad_form;
use crate::risk::MarketMoments;

/// Slack allowed when a requested target sits just outside the feasible range.
const TARGET_TOL: f64 = 1e-9;

/// Mean-variance solver bound to one set of moments and constraints.
#[derive(Clone, Copy, Debug)]
pub struct MeanVariance<'a> {
  moments: &'a MarketMoments,
  set: &'a FeasibleSet,
  qp: QpSettings,
  deadline: Deadline,
  bisection_tolerance: f64,
  bisection_max_iter: usize,
}

impl<'a> MeanVariance<'a> {
  pub fn new(
    moments: &'a MarketMoments,
    set: &'a FeasibleSet,
    qp: QpSettings,
    deadline: Deadline,
    bisection_tolerance: f64,
    bisection_max_iter: usize,
  ) -> Self {
    Self {
      moments,
      set,
      qp,
      deadline,
      bisection_tolerance,
      bisection_max_iter,
    }
  }

  pub fn moments(&self) -> &MarketMoments {
    self.moments
  }

  /// `[min μᵀw, max μᵀw]` over the feasible set.
  pub fn return_range(&self) -> (f64, f64) {
    self.set.return_range(&self.moments.mu)
  }

  pub fn expected_return(&self, w: &DVector<f64>) -> f64 {
    self.moments.mu.dot(w)
  }

  pub fn volatility(&self, w: &DVector<f64>) -> f64 {
    quad_form(w, &self.moments.cov).max(0.0).sqrt()
  }

  fn problem(&self, target: Option<f64>) -> QpProblem {
    let n = self.set.n_assets();
    let sector_rows = if self.set.sector_limit.is_some() {
      self.set.sectors.len()
    } else {
      0
    };
    let m = 1 + n + sector_rows + usize::from(target.is_some());

    let mut a = DMatrix::<f64>::zeros(m, n);
    let mut l = DVector::<f64>::zeros(m);
    let mut u = DVector::<f64>::zeros(m);

    // budget
    a.row_mut(0).fill(1.0);
    l[0] = 1.0;
    u[0] = 1.0;

    for i in 0..n {
      a[(1 + i, i)] = 1.0;
      l[1 + i] = self.set.lower[i];
      u[1 + i] = self.set.upper[i];
    }

    let mut row = 1 + n;
    if let Some(limit) = self.set.sector_limit {
      for group in &self.set.sectors {
        for &i in group {
          a[(row, i)] = 1.0;
        }
        l[row] = f64::NEG_INFINITY;
        u[row] = limit;
        row += 1;
      }
    }

    if let Some(target) = target {
      for i in 0..n {
        a[(row, i)] = self.moments.mu[i];
      }
      l[row] = target;
      u[row] = target;
    }

    QpProblem {
      p: &self.moments.cov * 2.0,
      q: DVector::zeros(n),
      a,
      l,
      u,
    }
  }

  fn solve(&self, target: Option<f64>) -> Result<DVector<f64>> {
    let n = self.set.n_assets();
    let x0 = self.set.project_budget_box(&DVector::from_element(n, 1.0 / n as f64));
    let sol = self.problem(target).solve(&x0, &self.qp, &self.deadline)?;

    if !sol.converged {
      tracing::warn!(
        iterations = sol.iterations,
        primal_residual = sol.primal_residual,
        dual_residual = sol.dual_residual,
        "qp hit its iteration cap, projecting the last iterate"
      );
    }

    let w = self.set.project_budget_box(&sol.x);
    let sum = w.sum();
    if !sum.is_finite() || sum.abs() < 1e-12 {
      return Err(EngineError::Numerical("optimized weights do not sum to one".into()));
    }
    Ok(w / sum)
  }

  /// Global minimum-variance portfolio.
  pub fn min_variance(&self) -> Result<DVector<f64>> {
    self.solve(None)
  }

  /// Minimum-variance portfolio with `μᵀw = target`.
  pub fn efficient_return(&self, target: f64) -> Result<DVector<f64>> {
    let (lo, hi) = self.return_range();
    if !target.is_finite() || target < lo - TARGET_TOL || target > hi + TARGET_TOL {
      return Err(EngineError::ConstraintInfeasible(format!(
        "target return {target:.6} outside the attainable range [{lo:.6}, {hi:.6}]"
      )));
    }
    self.solve(Some(target.clamp(lo, hi)))
  }

  /// Highest-return portfolio whose volatility does not exceed `target_vol`.
  pub fn efficient_risk(&self, target_vol: f64) -> Result<DVector<f64>> {
    if !target_vol.is_finite() || target_vol <= 0.0 {
      return Err(EngineError::InvalidInput(format!(
        "target volatility must be positive, got {target_vol}"
      )));
    }

    let gmv = self.min_variance()?;
    let gmv_vol = self.volatility(&gmv);
    if target_vol < gmv_vol - TARGET_TOL {
      return Err(EngineError::ConstraintInfeasible(format!(
        "target volatility {target_vol:.6} below the minimum attainable {gmv_vol:.6}"
      )));
    }

    let (_, r_hi) = self.return_range();
    let top = self.efficient_return(r_hi)?;
    if target_vol >= self.volatility(&top) {
      return Ok(top);
    }

    let mut lo = self.expected_return(&gmv);
    let mut hi = r_hi;
    let mut best = gmv;

    for iter in 0..self.bisection_max_iter {
      self.deadline.check()?;

      let mid = 0.5 * (lo + hi);
      let w = self.efficient_return(mid)?;
      let vol = self.volatility(&w);

      if vol > target_vol {
        hi = mid;
      } else {
        lo = mid;
        best = w;
        if target_vol - vol <= self.bisection_tolerance * target_vol {
          tracing::debug!(iter, vol, target_vol, "risk target matched");
          break;
        }
      }

      if hi - lo <= self.bisection_tolerance * (1.0 + hi.abs()) {
        break;
      }
    }

    Ok(best)
  }

  /// Sharpe ratio of `w`, or `-inf` for a riskless portfolio.
  fn sharpe(&self, w: &DVector<f64>, risk_free: f64) -> f64 {
    let vol = self.volatility(w);
    if vol > 1e-15 {
      (self.expected_return(w) - risk_free) / vol
    } else {
      f64::NEG_INFINITY
    }
  }

  /// Return of the unconstrained tangency portfolio, if its direction is usable.
  fn tangency_return(&self, risk_free: f64) -> Result<Option<f64>> {
    let inv = inverse_spd(&self.moments.cov, "covariance")?;
    let direction = &inv * self.moments.mu.add_scalar(-risk_free);
    let scale = direction.sum();
    if !scale.is_finite() || scale <= 0.0 {
      tracing::debug!(scale, "tangency direction is degenerate");
      return Ok(None);
    }
    Ok(Some(self.expected_return(&(direction / scale))))
  }

  /// Maximum-Sharpe portfolio on the constrained efficient frontier.
  ///
  /// The tangency return (clamped into `[r_gmv, r_hi]`) is the first candidate. A
  /// golden-section search over the same range then refines it, the Sharpe ratio
  /// being unimodal along the frontier once some portfolio beats the risk-free rate.
  pub fn max_sharpe(&self, risk_free: f64) -> Result<DVector<f64>> {
    let gmv = self.min_variance()?;
    let r_gmv = self.expected_return(&gmv);
    let (_, r_hi) = self.return_range();

    if r_hi <= risk_free + TARGET_TOL {
      tracing::warn!(
        risk_free,
        r_hi,
        "no feasible portfolio beats the risk-free rate, falling back to minimum variance"
      );
      return Ok(gmv);
    }
    if r_hi - r_gmv <= TARGET_TOL {
      return Ok(gmv);
    }

    let mut best_sharpe = self.sharpe(&gmv, risk_free);
    let mut best = gmv;
    let mut keep = |w: DVector<f64>, sharpe: f64| {
      if sharpe > best_sharpe {
        best_sharpe = sharpe;
        best = w;
      }
    };

    let top = self.efficient_return(r_hi)?;
    let top_sharpe = self.sharpe(&top, risk_free);
    keep(top, top_sharpe);

    if let Some(r_tan) = self.tangency_return(risk_free)? {
      let target = r_tan.clamp(r_gmv, r_hi);
      tracing::debug!(r_tan, r_gmv, r_hi, target, "tangency target return");
      let w = self.efficient_return(target)?;
      let sharpe = self.sharpe(&w, risk_free);
      keep(w, sharpe);
    }

    let inv_phi = (5.0_f64.sqrt() - 1.0) / 2.0;
    let (mut a, mut b) = (r_gmv, r_hi);
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut wc = self.efficient_return(c)?;
    let mut fc = self.sharpe(&wc, risk_free);
    let mut wd = self.efficient_return(d)?;
    let mut fd = self.sharpe(&wd, risk_free);

    for iter in 0..self.bisection_max_iter {
      self.deadline.check()?;
      if b - a <= self.bisection_tolerance * (1.0 + b.abs()) {
        tracing::debug!(iter, a, b, "sharpe search converged");
        break;
      }

      if fc >= fd {
        b = d;
        d = c;
        wd = wc;
        fd = fc;
        c = b - inv_phi * (b - a);
        wc = self.efficient_return(c)?;
        fc = self.sharpe(&wc, risk_free);
      } else {
        a = c;
        c = d;
        wc = wd;
        fc = fd;
        d = a + inv_phi * (b - a);
        wd = self.efficient_return(d)?;
        fd = self.sharpe(&wd, risk_free);
      }
    }

    keep(wc, fc);
    keep(wd, fd);
    Ok(best)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;
  use crate::types::Constraints;

  fn moments(mu: &[f64], cov: &[f64]) -> MarketMoments {
    let n = mu.len();
    MarketMoments {
      tickers: (0..n).map(|i| format!("A{i}")).collect(),
      mu: DVector::from_column_slice(mu),
      cov: DMatrix::from_row_slice(n, n, cov),
      ridge: 0.0,
    }
  }

  fn three_assets() -> MarketMoments {
    moments(
      &[0.08, 0.12, 0.15],
      &[
        0.04, 0.006, 0.004, //
        0.006, 0.09, 0.012, //
        0.004, 0.012, 0.16,
      ],
    )
  }

  fn long_only(n: usize) -> FeasibleSet {
    FeasibleSet::new(&Constraints::default(), &vec![None; n]).unwrap()
  }

  fn solver<'a>(m: &'a MarketMoments, set: &'a FeasibleSet) -> MeanVariance<'a> {
    MeanVariance::new(m, set, QpSettings::default(), Deadline::unbounded(), 1e-10, 200)
  }

  #[test]
  fn min_variance_beats_every_single_asset() {
    let m = three_assets();
    let set = long_only(3);
    let mv = solver(&m, &set);
    let w = mv.min_variance().unwrap();

    assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-12);
    assert!(w.iter().all(|&x| x >= -1e-9));
    let vol = mv.volatility(&w);
    for v in m.asset_volatilities() {
      assert!(vol <= v + 1e-9);
    }
  }

  #[test]
  fn unconstrained_min_variance_matches_closed_form() {
    let m = three_assets();
    let set = FeasibleSet::boxed(vec![-1.0; 3], vec![1.0; 3]).unwrap();
    let w = solver(&m, &set).min_variance().unwrap();

    let inv = m.cov.clone().cholesky().unwrap().inverse();
    let raw = &inv * DVector::from_element(3, 1.0);
    let expected = &raw / raw.sum();
    for i in 0..3 {
      assert_abs_diff_eq!(w[i], expected[i], epsilon = 1e-6);
    }
  }

  #[test]
  fn efficient_return_hits_target() {
    let m = three_assets();
    let set = long_only(3);
    let mv = solver(&m, &set);
    let w = mv.efficient_return(0.12).unwrap();

    assert_abs_diff_eq!(mv.expected_return(&w), 0.12, epsilon = 1e-6);
    assert!(set.max_violation(&w) < 1e-6);
  }

  #[test]
  fn efficient_return_outside_range_is_infeasible() {
    let m = three_assets();
    let set = long_only(3);
    let err = solver(&m, &set).efficient_return(0.2).unwrap_err();
    assert!(matches!(err, EngineError::ConstraintInfeasible(_)));
  }

  #[test]
  fn max_weight_is_respected() {
    let m = three_assets();
    let c = Constraints::new(0.4, None, None, true).unwrap();
    let set = FeasibleSet::new(&c, &vec![None; 3]).unwrap();
    let mv = solver(&m, &set);
    let (_, hi) = mv.return_range();
    let w = mv.efficient_return(hi).unwrap();

    assert!(w.iter().all(|&x| x <= 0.4 + 1e-6));
    assert_abs_diff_eq!(hi, 0.4 * 0.15 + 0.4 * 0.12 + 0.2 * 0.08, epsilon = 1e-12);
  }

  #[test]
  fn sector_limit_is_respected() {
    let m = three_assets();
    let c = Constraints::new(1.0, None, Some(0.5), true).unwrap();
    let sectors = vec![Some("x".to_string()), Some("y".to_string()), Some("y".to_string())];
    let set = FeasibleSet::new(&c, &sectors).unwrap();
    let mv = solver(&m, &set);
    let w = mv.max_sharpe(0.02).unwrap();

    assert!(w[1] + w[2] <= 0.5 + 1e-6);
    assert!(w[0] <= 0.5 + 1e-6);
    assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-12);
  }

  #[test]
  fn efficient_risk_matches_target_volatility() {
    let m = three_assets();
    let set = long_only(3);
    let mv = solver(&m, &set);
    let gmv_vol = mv.volatility(&mv.min_variance().unwrap());
    let target = gmv_vol + 0.03;
    let w = mv.efficient_risk(target).unwrap();

    assert_abs_diff_eq!(mv.volatility(&w), target, epsilon = 1e-6);
  }

  #[test]
  fn efficient_risk_below_minimum_is_infeasible() {
    let m = three_assets();
    let set = long_only(3);
    let err = solver(&m, &set).efficient_risk(0.05).unwrap_err();
    assert!(matches!(err, EngineError::ConstraintInfeasible(_)));
  }

  #[test]
  fn efficient_risk_above_maximum_returns_top_portfolio() {
    let m = three_assets();
    let set = long_only(3);
    let mv = solver(&m, &set);
    let w = mv.efficient_risk(0.9).unwrap();
    assert_abs_diff_eq!(w[2], 1.0, epsilon = 1e-6);
  }

  #[test]
  fn max_sharpe_beats_min_variance_sharpe() {
    let m = three_assets();
    let set = long_only(3);
    let mv = solver(&m, &set);
    let rf = 0.02;
    let sharpe = |w: &DVector<f64>| (mv.expected_return(w) - rf) / mv.volatility(w);

    let tan = mv.max_sharpe(rf).unwrap();
    let gmv = mv.min_variance().unwrap();
    assert!(sharpe(&tan) >= sharpe(&gmv) - 1e-9);
  }

  #[test]
  fn max_sharpe_beats_every_frontier_target() {
    // Highly correlated pair where the unconstrained tangency direction sums negative.
    let m = moments(&[0.03, 0.10], &[0.01, 0.027, 0.027, 0.09]);
    let set = long_only(2);
    let mv = solver(&m, &set);
    let rf = 0.02;
    let sharpe = |w: &DVector<f64>| (mv.expected_return(w) - rf) / mv.volatility(w);

    let best = mv.max_sharpe(rf).unwrap();
    assert_abs_diff_eq!(best[1], 1.0, epsilon = 1e-6);

    let (lo, hi) = mv.return_range();
    for k in 0..=20 {
      let target = lo + (hi - lo) * k as f64 / 20.0;
      let w = mv.efficient_return(target).unwrap();
      assert!(sharpe(&best) >= sharpe(&w) - 1e-7, "target {target}");
    }
  }

  #[test]
  fn interior_sharpe_optimum_is_found() {
    let m = three_assets();
    let set = long_only(3);
    let mv = solver(&m, &set);
    let rf = 0.02;
    let sharpe = |w: &DVector<f64>| (mv.expected_return(w) - rf) / mv.volatility(w);

    let best = mv.max_sharpe(rf).unwrap();
    let gmv = mv.min_variance().unwrap();
    let (_, hi) = mv.return_range();
    let r_gmv = mv.expected_return(&gmv);
    for k in 0..=30 {
      let target = r_gmv + (hi - r_gmv) * k as f64 / 30.0;
      let w = mv.efficient_return(target).unwrap();
      assert!(sharpe(&best) >= sharpe(&w) - 1e-7, "target {target}");
    }
  }

  #[test]
  fn unreachable_risk_free_rate_falls_back_to_min_variance() {
    let m = three_assets();
    let set = long_only(3);
    let mv = solver(&m, &set);
    let w = mv.max_sharpe(0.5).unwrap();
    let gmv = mv.min_variance().unwrap();
    for i in 0..3 {
      assert_abs_diff_eq!(w[i], gmv[i], epsilon = 1e-9);
    }
  }
}
