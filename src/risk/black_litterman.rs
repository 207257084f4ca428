//! # Black-Litterman Posterior
//!
//! $$
//! \Pi=\delta\Sigma w_m,\qquad
//! \mu_{BL}=\left[(\tau\Sigma)^{-1}+P^\top\Omega^{-1}P\right]^{-1}
//! \left[(\tau\Sigma)^{-1}\Pi+P^\top\Omega^{-1}Q\right]
//! $$
//!
//! $$
//! \Sigma_{BL}=\Sigma+\left[(\tau\Sigma)^{-1}+P^\top\Omega^{-1}P\right]^{-1}
//! $$
//!
//! Source:
//! - Black, F. and Litterman, R. (1992), "Global Portfolio Optimization"
//! - He, G. and Litterman, R. (1999), "The Intuition Behind Black-Litterman Model Portfolios"

use nalgebra::DMatrix;
use nalgebra::DVector;
use serde::Deserialize;
use serde::Serialize;

use super::linalg::inverse_spd;
use super::linalg::quad_form;
use crate::error::EngineError;
use crate::error::Result;

/// An investor view addressed by ticker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum View {
  /// `ticker` returns `expected_return` (annualized).
  #[serde(rename_all = "camelCase")]
  Absolute {
    ticker: String,
    expected_return: f64,
    /// View variance; derived from the prior when absent.
    #[serde(default)]
    confidence: Option<f64>,
  },
  /// `outperformer` beats `underperformer` by `spread` (annualized).
  #[serde(rename_all = "camelCase")]
  Relative {
    outperformer: String,
    underperformer: String,
    spread: f64,
    #[serde(default)]
    confidence: Option<f64>,
  },
}

/// Views in pick-matrix form: `P w ~ N(Q, Ω)`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewMatrix {
  /// `k x n` pick matrix.
  pub p: Vec<Vec<f64>>,
  /// `k` view returns.
  pub q: Vec<f64>,
  /// Diagonal of `Ω`; missing or `None` entries use `(P τΣ Pᵀ)_kk`.
  #[serde(default)]
  pub omega: Vec<Option<f64>>,
}

impl ViewMatrix {
  /// Compile ticker-addressed views against the asset order `tickers`.
  pub fn from_views(views: &[View], tickers: &[String]) -> Result<Self> {
    let n = tickers.len();
    let index = |t: &str| {
      tickers
        .iter()
        .position(|x| x == t)
        .ok_or_else(|| EngineError::InvalidInput(format!("view references unknown ticker {t}")))
    };

    let mut out = ViewMatrix::default();
    for view in views {
      let mut row = vec![0.0; n];
      match view {
        View::Absolute {
          ticker,
          expected_return,
          confidence,
        } => {
          row[index(ticker)?] = 1.0;
          out.q.push(*expected_return);
          out.omega.push(*confidence);
        }
        View::Relative {
          outperformer,
          underperformer,
          spread,
          confidence,
        } => {
          let a = index(outperformer)?;
          let b = index(underperformer)?;
          if a == b {
            return Err(EngineError::InvalidInput(format!(
              "relative view compares {outperformer} with itself"
            )));
          }
          row[a] = 1.0;
          row[b] = -1.0;
          out.q.push(*spread);
          out.omega.push(*confidence);
        }
      }
      out.p.push(row);
    }

    Ok(out)
  }

  pub fn len(&self) -> usize {
    self.q.len()
  }

  pub fn is_empty(&self) -> bool {
    self.q.is_empty()
  }

  fn validate(&self, n: usize) -> Result<()> {
    if self.p.len() != self.q.len() {
      return Err(EngineError::InvalidInput(format!(
        "pick matrix has {} rows for {} view returns",
        self.p.len(),
        self.q.len()
      )));
    }
    if let Some(row) = self.p.iter().find(|row| row.len() != n) {
      return Err(EngineError::InvalidInput(format!(
        "pick matrix row has {} entries for {n} assets",
        row.len()
      )));
    }
    if !self.omega.is_empty() && self.omega.len() != self.q.len() {
      return Err(EngineError::InvalidInput(format!(
        "omega has {} entries for {} views",
        self.omega.len(),
        self.q.len()
      )));
    }
    Ok(())
  }
}

/// Parameters of the Black-Litterman blend.
#[derive(Clone, Copy, Debug)]
pub struct BlackLitterman {
  /// Prior uncertainty scale.
  pub tau: f64,
  /// Fixed risk aversion; implied from the market portfolio when `None`.
  pub risk_aversion: Option<f64>,
  /// Used when the implied risk aversion is non-positive or not finite.
  pub fallback_risk_aversion: f64,
  pub risk_free: f64,
}

impl Default for BlackLitterman {
  fn default() -> Self {
    Self {
      tau: 0.05,
      risk_aversion: None,
      fallback_risk_aversion: 2.5,
      risk_free: 0.0,
    }
  }
}

/// Prior and posterior moments.
#[derive(Clone, Debug)]
pub struct Posterior {
  /// Market-implied equilibrium returns `Π`.
  pub prior: DVector<f64>,
  pub mu: DVector<f64>,
  pub cov: DMatrix<f64>,
  /// Risk aversion used for `Π`.
  pub delta: f64,
}

impl BlackLitterman {
  /// `δ = (w_mᵀμ − r_f) / (w_mᵀΣw_m)`, the market's Sharpe-to-variance ratio.
  pub fn implied_risk_aversion(&self, mu: &DVector<f64>, cov: &DMatrix<f64>, w_market: &DVector<f64>) -> f64 {
    if let Some(delta) = self.risk_aversion {
      return delta;
    }

    let var = quad_form(w_market, cov);
    let delta = (w_market.dot(mu) - self.risk_free) / var;
    if delta.is_finite() && delta > 0.0 {
      delta
    } else {
      tracing::warn!(
        implied = delta,
        fallback = self.fallback_risk_aversion,
        "implied risk aversion unusable, using fallback"
      );
      self.fallback_risk_aversion
    }
  }

  /// Blend the market prior with `views`; without views `P = I, Q = Π`.
  pub fn posterior(
    &self,
    mu: &DVector<f64>,
    cov: &DMatrix<f64>,
    w_market: &DVector<f64>,
    views: Option<&ViewMatrix>,
  ) -> Result<Posterior> {
    let n = mu.len();
    if cov.nrows() != n || w_market.len() != n {
      return Err(EngineError::InvalidInput(
        "market weights, returns and covariance disagree in size".into(),
      ));
    }

    let delta = self.implied_risk_aversion(mu, cov, w_market);
    let prior = (cov * w_market) * delta;

    let (p, q, omega_given) = match views.filter(|v| !v.is_empty()) {
      Some(v) => {
        v.validate(n)?;
        let k = v.len();
        let p = DMatrix::from_fn(k, n, |i, j| v.p[i][j]);
        let q = DVector::from_column_slice(&v.q);
        let omega: Vec<Option<f64>> = if v.omega.is_empty() {
          vec![None; k]
        } else {
          v.omega.clone()
        };
        (p, q, omega)
      }
      None => (DMatrix::identity(n, n), prior.clone(), vec![None; n]),
    };

    let tau_cov = cov * self.tau;
    let implied_omega = &p * &tau_cov * p.transpose();
    let mut omega_inv = DVector::zeros(q.len());
    for (k, given) in omega_given.iter().enumerate() {
      let w = given.unwrap_or(implied_omega[(k, k)]);
      if !(w.is_finite() && w > 0.0) {
        return Err(EngineError::InvalidInput(format!(
          "view {k} has non-positive uncertainty {w}"
        )));
      }
      omega_inv[k] = 1.0 / w;
    }
    let omega_inv = DMatrix::from_diagonal(&omega_inv);

    let tau_cov_inv = inverse_spd(&tau_cov, "scaled prior covariance")?;
    let precision = &tau_cov_inv + p.transpose() * &omega_inv * &p;
    let posterior_cov = inverse_spd(&precision, "posterior precision")?;
    let rhs = &tau_cov_inv * &prior + p.transpose() * &omega_inv * &q;

    let mu_bl = &posterior_cov * rhs;
    let cov_bl = cov + posterior_cov;

    tracing::debug!(delta, views = q.len(), "black-litterman posterior");

    Ok(Posterior {
      prior,
      mu: mu_bl,
      cov: cov_bl,
      delta,
    })
  }
}
