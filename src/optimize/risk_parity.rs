//! # Risk Parity
//!
//! $$
//! RC_i=\frac{w_i(\Sigma w)_i}{w^\top\Sigma w},\qquad
//! w_i\leftarrow w_i\Big(\frac{b_i}{RC_i}\Big)^{\gamma}
//! $$
//!
//! Multiplicative fixed-point iteration towards a risk budget `b`.

use nalgebra::DMatrix;
use nalgebra::DVector;

use super::feasible::FeasibleSet;
use crate::deadline::Deadline;
use crate::error::EngineError;
use crate::error::Result;

const WEIGHT_FLOOR: f64 = 1e-12;

/// Share of portfolio variance carried by each asset.
pub fn risk_contributions(w: &DVector<f64>, cov: &DMatrix<f64>) -> DVector<f64> {
  let sigma_w = cov * w;
  let var = w.dot(&sigma_w);
  if var <= 0.0 {
    return DVector::zeros(w.len());
  }
  w.component_mul(&sigma_w) / var
}

/// Risk-budgeting solver.
#[derive(Clone, Copy, Debug)]
pub struct RiskParity {
  /// Exponent `γ` of the update.
  pub damping: f64,
  pub tolerance: f64,
  pub max_iter: usize,
}

impl Default for RiskParity {
  fn default() -> Self {
    Self {
      damping: 0.5,
      tolerance: 1e-6,
      max_iter: 500,
    }
  }
}

impl RiskParity {
  fn budget(n: usize, budget: Option<&[f64]>) -> Result<DVector<f64>> {
    let Some(b) = budget else {
      return Ok(DVector::from_element(n, 1.0 / n as f64));
    };

    if b.len() != n {
      return Err(EngineError::InvalidInput(format!(
        "risk budget has {} entries for {n} assets",
        b.len()
      )));
    }
    if b.iter().any(|x| !x.is_finite() || *x <= 0.0) {
      return Err(EngineError::InvalidInput(
        "risk budget entries must be positive".into(),
      ));
    }
    let total: f64 = b.iter().sum();
    Ok(DVector::from_iterator(n, b.iter().map(|x| x / total)))
  }

  fn restrict(set: &FeasibleSet, w: &DVector<f64>) -> DVector<f64> {
    let mut w = set.project_budget_box(&(w / w.sum()));
    w.apply(|x| *x = x.max(WEIGHT_FLOOR));
    let sum = w.sum();
    w / sum
  }

  /// Weights whose risk contributions match `budget` (equal when `None`),
  /// kept inside the box bounds of `set`.
  pub fn solve(
    &self,
    cov: &DMatrix<f64>,
    budget: Option<&[f64]>,
    set: &FeasibleSet,
    deadline: &Deadline,
  ) -> Result<DVector<f64>> {
    let n = cov.nrows();
    if n == 0 || n != set.n_assets() {
      return Err(EngineError::InvalidInput(format!(
        "covariance of {n} assets does not match {} bounds",
        set.n_assets()
      )));
    }
    let b = Self::budget(n, budget)?;

    let mut w = DVector::zeros(n);
    for i in 0..n {
      let var = cov[(i, i)];
      if !var.is_finite() || var <= 0.0 {
        return Err(EngineError::Numerical(format!(
          "asset {i} has non-positive variance {var}"
        )));
      }
      w[i] = b[i] / var.sqrt();
    }
    w = Self::restrict(set, &w);

    let mut residual = f64::INFINITY;
    for iter in 1..=self.max_iter {
      deadline.check()?;

      let rc = risk_contributions(&w, cov);
      residual = (&rc - &b).amax();
      if residual < self.tolerance {
        tracing::debug!(iter, residual, "risk parity converged");
        return Ok(w);
      }

      let stepped = DVector::from_fn(n, |i, _| {
        w[i] * (b[i] / rc[i].max(WEIGHT_FLOOR)).powf(self.damping)
      });
      let next = Self::restrict(set, &stepped);
      let step = (&next - &w).amax();
      w = next;

      // pinned by a bound: budgets cannot be met, but the iterate no longer moves
      if step < WEIGHT_FLOOR && Self::bound_active(set, &w) {
        tracing::debug!(iter, residual, "risk parity stationary at a bound");
        return Ok(w);
      }
    }

    Err(EngineError::Convergence {
      iterations: self.max_iter,
      residual,
    })
  }

  fn bound_active(set: &FeasibleSet, w: &DVector<f64>) -> bool {
    (0..w.len()).any(|i| {
      w[i] >= set.upper[i] - 1e-9 || (set.lower[i] > 0.0 && w[i] <= set.lower[i] + 1e-9)
    })
  }
}
