//! # Efficient Frontier
//!
//! $$
//! \mathcal F=\Big\{\big(\sigma(w^\*_r),\,r\big):\ r\in[r_{gmv},\ \min(\max_i\mu_i,\ r_{\max})]\Big\}
//! $$
//!
//! Evenly spaced target returns, each solved as a minimum-variance problem.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use rayon::prelude::*;

use super::mean_variance::MeanVariance;
use crate::error::EngineError;
use crate::error::Result;
use crate::types::FrontierPoint;

/// Return ranges narrower than this collapse to the minimum-variance point.
const RANGE_EPS: f64 = 1e-9;

/// Samples the efficient frontier of a [`MeanVariance`] problem.
#[derive(Clone, Copy, Debug)]
pub struct FrontierSampler {
  pub points: usize,
}

impl Default for FrontierSampler {
  fn default() -> Self {
    Self { points: 50 }
  }
}

/// `k` evenly spaced values from `a` to `b` inclusive.
fn linspace(a: f64, b: f64, k: usize) -> Vec<f64> {
  match k {
    0 => Vec::new(),
    1 => vec![a],
    _ => {
      let step = (b - a) / (k - 1) as f64;
      (0..k).map(|i| a + step * i as f64).collect()
    }
  }
}

/// Sort by risk (ties by higher return first) and keep strictly improving returns.
pub fn non_dominated(mut points: Vec<FrontierPoint>) -> Vec<FrontierPoint> {
  points.retain(|p| p.risk.is_finite() && p.ret.is_finite());
  points.sort_by_key(|p| (OrderedFloat(p.risk), Reverse(OrderedFloat(p.ret))));

  let mut out: Vec<FrontierPoint> = Vec::with_capacity(points.len());
  for p in points {
    if out.last().map_or(true, |last| p.ret > last.ret) {
      out.push(p);
    }
  }
  out
}

impl FrontierSampler {
  /// Solve every target in parallel; infeasible targets are dropped.
  pub fn sample(&self, mv: &MeanVariance<'_>) -> Result<Vec<FrontierPoint>> {
    let gmv = mv.min_variance()?;
    let r_gmv = mv.expected_return(&gmv);
    let (_, r_hi) = mv.return_range();
    let best_asset = mv.moments().mu.max();
    let r_top = best_asset.min(r_hi);

    let targets = if r_top > r_gmv + RANGE_EPS {
      linspace(r_gmv, r_top, self.points)
    } else {
      vec![r_gmv]
    };

    let solved: Vec<Result<Option<FrontierPoint>>> = targets
      .par_iter()
      .map(|&target| match mv.efficient_return(target) {
        Ok(w) => Ok(Some(FrontierPoint::new(mv.volatility(&w), mv.expected_return(&w)))),
        Err(EngineError::ConstraintInfeasible(_)) => Ok(None),
        Err(e) => Err(e),
      })
      .collect();

    let mut points = Vec::with_capacity(solved.len());
    for p in solved {
      if let Some(p) = p? {
        points.push(p);
      }
    }

    let frontier = non_dominated(points);
    tracing::debug!(
      requested = targets.len(),
      kept = frontier.len(),
      r_gmv,
      r_top,
      "efficient frontier sampled"
    );
    Ok(frontier)
  }
}

#[cfg(test)]
mod tests {
  use nalgebra::DMatrix;
  use nalgebra::DVector;

  use super::*;
  use crate::config::QpSettings;
  use crate::deadline::Deadline;
  use crate::optimize::feasible::FeasibleSet;
  use crate::risk::MarketMoments;
  use crate::types::Constraints;

  #[test]
  fn dominated_points_are_removed() {
    let pts = vec![
      FrontierPoint::new(0.20, 0.10),
      FrontierPoint::new(0.10, 0.05),
      FrontierPoint::new(0.15, 0.04),
      FrontierPoint::new(0.10, 0.06),
      FrontierPoint::new(0.25, 0.12),
    ];
    let out = non_dominated(pts);
    assert_eq!(
      out,
      vec![
        FrontierPoint::new(0.10, 0.06),
        FrontierPoint::new(0.20, 0.10),
        FrontierPoint::new(0.25, 0.12),
      ]
    );
  }

  #[test]
  fn frontier_is_monotone_and_spans_the_range() {
    let moments = MarketMoments {
      tickers: vec!["A".into(), "B".into(), "C".into()],
      mu: DVector::from_column_slice(&[0.06, 0.10, 0.14]),
      cov: DMatrix::from_row_slice(
        3,
        3,
        &[
          0.02, 0.004, 0.002, //
          0.004, 0.05, 0.01, //
          0.002, 0.01, 0.12,
        ],
      ),
      ridge: 0.0,
    };
    let set = FeasibleSet::new(&Constraints::default(), &vec![None; 3]).unwrap();
    let mv = MeanVariance::new(&moments, &set, QpSettings::default(), Deadline::unbounded(), 1e-10, 200);
    let frontier = FrontierSampler { points: 12 }.sample(&mv).unwrap();

    assert!(frontier.len() >= 10);
    for pair in frontier.windows(2) {
      assert!(pair[1].risk > pair[0].risk);
      assert!(pair[1].ret > pair[0].ret);
    }
    let last = frontier.last().unwrap();
    assert!((last.ret - 0.14).abs() < 1e-6);
    assert!((last.risk - 0.12_f64.sqrt()).abs() < 1e-6);
  }

  #[test]
  fn single_target_when_range_collapses() {
    let moments = MarketMoments {
      tickers: vec!["A".into(), "B".into()],
      mu: DVector::from_column_slice(&[0.05, 0.05]),
      cov: DMatrix::from_row_slice(2, 2, &[0.04, 0.0, 0.0, 0.01]),
      ridge: 0.0,
    };
    let set = FeasibleSet::new(&Constraints::default(), &vec![None; 2]).unwrap();
    let mv = MeanVariance::new(&moments, &set, QpSettings::default(), Deadline::unbounded(), 1e-10, 200);
    let frontier = FrontierSampler::default().sample(&mv).unwrap();
    assert_eq!(frontier.len(), 1);
  }
}
