//! # Quadratic Program Solver
//!
//! $$
//! \min_x\ \tfrac12 x^\top P x+q^\top x\quad\text{s.t.}\quad l\le Ax\le u
//! $$
//!
//! Operator-splitting (ADMM) iteration:
//! $$
//! (P+\sigma I+A^\top RA)\tilde x=\sigma x^k-q+A^\top(Rz^k-y^k),\qquad
//! z^{k+1}=\Pi_{[l,u]}\big(\alpha A\tilde x+(1-\alpha)z^k+R^{-1}y^k\big)
//! $$
//!
//! Source:
//! - Stellato et al. (2020), "OSQP: an operator splitting solver for quadratic programs"

use nalgebra::Cholesky;
use nalgebra::DMatrix;
use nalgebra::DVector;
use nalgebra::Dyn;

use crate::config::QpSettings;
use crate::deadline::Deadline;
use crate::error::EngineError;
use crate::error::Result;

/// Problem data; rows with `l == u` are treated as equalities.
#[derive(Clone, Debug)]
pub struct QpProblem {
  pub p: DMatrix<f64>,
  pub q: DVector<f64>,
  pub a: DMatrix<f64>,
  pub l: DVector<f64>,
  pub u: DVector<f64>,
}

/// Solver output.
#[derive(Clone, Debug)]
pub struct QpSolution {
  pub x: DVector<f64>,
  pub iterations: usize,
  pub converged: bool,
  pub primal_residual: f64,
  pub dual_residual: f64,
}

fn inf_norm(v: &DVector<f64>) -> f64 {
  v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

struct Kkt {
  rho: DVector<f64>,
  factor: Cholesky<f64, Dyn>,
}

impl QpProblem {
  fn rho_vector(&self, rho: f64, settings: &QpSettings) -> DVector<f64> {
    DVector::from_fn(self.l.len(), |i, _| {
      if (self.u[i] - self.l[i]).abs() < 1e-12 {
        rho * settings.rho_eq_scale
      } else {
        rho
      }
    })
  }

  fn factor(&self, rho: DVector<f64>, sigma: f64) -> Result<Kkt> {
    let n = self.p.nrows();
    let at_r = self.a.transpose() * DMatrix::from_diagonal(&rho);
    let k = &self.p + DMatrix::identity(n, n) * sigma + at_r * &self.a;
    let factor = k
      .cholesky()
      .ok_or_else(|| EngineError::Numerical("QP system matrix is not positive definite".into()))?;
    Ok(Kkt { rho, factor })
  }

  /// Solve from the starting point `x0`.
  pub fn solve(&self, x0: &DVector<f64>, settings: &QpSettings, deadline: &Deadline) -> Result<QpSolution> {
    let m = self.a.nrows();
    if self.a.ncols() != self.p.nrows() || self.l.len() != m || self.u.len() != m {
      return Err(EngineError::InvalidInput("QP dimensions disagree".into()));
    }

    let mut rho = settings.rho;
    let mut kkt = self.factor(self.rho_vector(rho, settings), settings.sigma)?;

    let mut x = x0.clone();
    let mut z = (&self.a * &x).zip_zip_map(&self.l, &self.u, |v, lo, hi| v.clamp(lo, hi));
    let mut y = DVector::<f64>::zeros(m);

    let alpha = settings.alpha;
    let mut primal_residual = f64::INFINITY;
    let mut dual_residual = f64::INFINITY;

    for iter in 1..=settings.max_iter {
      let rhs = &x * settings.sigma - &self.q
        + self.a.transpose() * (kkt.rho.component_mul(&z) - &y);
      let x_tilde = kkt.factor.solve(&rhs);
      let z_tilde = &self.a * &x_tilde;

      x = &x_tilde * alpha + &x * (1.0 - alpha);
      let z_relaxed = &z_tilde * alpha + &z * (1.0 - alpha);
      let z_next = (&z_relaxed + y.component_div(&kkt.rho))
        .zip_zip_map(&self.l, &self.u, |v, lo, hi| v.clamp(lo, hi));
      y += kkt.rho.component_mul(&(&z_relaxed - &z_next));
      z = z_next;

      if iter % 10 != 0 && iter != settings.max_iter {
        continue;
      }
      deadline.check()?;

      let ax = &self.a * &x;
      let px = &self.p * &x;
      let aty = self.a.transpose() * &y;
      primal_residual = inf_norm(&(&ax - &z));
      dual_residual = inf_norm(&(&px + &self.q + &aty));

      let primal_scale = inf_norm(&ax).max(inf_norm(&z));
      let dual_scale = inf_norm(&px).max(inf_norm(&aty)).max(inf_norm(&self.q));
      let eps_primal = settings.eps_abs + settings.eps_rel * primal_scale;
      let eps_dual = settings.eps_abs + settings.eps_rel * dual_scale;

      if primal_residual <= eps_primal && dual_residual <= eps_dual {
        tracing::debug!(iter, primal_residual, dual_residual, rho, "qp converged");
        return Ok(QpSolution {
          x,
          iterations: iter,
          converged: true,
          primal_residual,
          dual_residual,
        });
      }

      if iter % settings.adaptive_rho_interval == 0 {
        let primal_rel = primal_residual / primal_scale.max(1e-12);
        let dual_rel = dual_residual / dual_scale.max(1e-12);
        let ratio = (primal_rel / dual_rel.max(1e-30)).sqrt();
        if ratio.is_finite() && !(0.2..=5.0).contains(&ratio) {
          rho = (rho * ratio).clamp(1e-6, 1e6);
          kkt = self.factor(self.rho_vector(rho, settings), settings.sigma)?;
          tracing::debug!(iter, rho, "qp rho updated");
        }
      }
    }

    Ok(QpSolution {
      x,
      iterations: settings.max_iter,
      converged: false,
      primal_residual,
      dual_residual,
    })
  }
}
