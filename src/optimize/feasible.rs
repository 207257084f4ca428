//! # Feasible Set
//!
//! $$
//! \mathcal W=\Big\{w:\ \mathbf 1^\top w=1,\ \ell\le w\le u,\ \sum_{i\in g}w_i\le s\ \ \forall g\Big\}
//! $$
//!
//! Box, budget and disjoint sector constraints form a laminar family, so linear
//! objectives over `𝒲` are solved exactly by a greedy fill.

use std::collections::BTreeMap;

use nalgebra::DVector;

use crate::error::EngineError;
use crate::error::Result;
use crate::types::Constraints;

const FEASIBILITY_TOL: f64 = 1e-9;

/// Weight bounds and sector groups of one request.
#[derive(Clone, Debug)]
pub struct FeasibleSet {
  pub lower: Vec<f64>,
  pub upper: Vec<f64>,
  /// Disjoint groups of asset indices sharing a sector.
  pub sectors: Vec<Vec<usize>>,
  pub sector_limit: Option<f64>,
}

impl FeasibleSet {
  /// Bounds from `constraints` for assets tagged with `sectors`.
  pub fn new(constraints: &Constraints, sectors: &[Option<String>]) -> Result<Self> {
    let n = sectors.len();
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, s) in sectors.iter().enumerate() {
      if let Some(s) = s {
        groups.entry(s.as_str()).or_default().push(i);
      }
    }

    let set = Self {
      lower: vec![constraints.lower_bound(); n],
      upper: vec![constraints.max_weight(); n],
      sectors: groups.into_values().collect(),
      sector_limit: constraints.sector_limit(),
    };
    set.check()?;
    Ok(set)
  }

  /// Plain box bounds without sector groups.
  pub fn boxed(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
    let set = Self {
      lower,
      upper,
      sectors: Vec::new(),
      sector_limit: None,
    };
    set.check()?;
    Ok(set)
  }

  pub fn n_assets(&self) -> usize {
    self.lower.len()
  }

  fn sector_of(&self) -> Vec<Option<usize>> {
    let mut out = vec![None; self.n_assets()];
    if self.sector_limit.is_some() {
      for (g, members) in self.sectors.iter().enumerate() {
        for &i in members {
          out[i] = Some(g);
        }
      }
    }
    out
  }

  /// Remaining capacity of each sector once every member sits at its lower bound.
  fn sector_room(&self) -> Vec<f64> {
    match self.sector_limit {
      Some(limit) => self
        .sectors
        .iter()
        .map(|g| limit - g.iter().map(|&i| self.lower[i]).sum::<f64>())
        .collect(),
      None => Vec::new(),
    }
  }

  /// Fail with [`EngineError::ConstraintInfeasible`] when `𝒲` is empty.
  pub fn check(&self) -> Result<()> {
    let n = self.n_assets();
    if n == 0 {
      return Err(EngineError::InvalidInput("no assets to allocate".into()));
    }
    if let Some(i) = (0..n).find(|&i| self.lower[i] > self.upper[i]) {
      return Err(EngineError::ConstraintInfeasible(format!(
        "lower bound {} exceeds upper bound {} for asset {i}",
        self.lower[i], self.upper[i]
      )));
    }

    let lower_sum: f64 = self.lower.iter().sum();
    if lower_sum > 1.0 + FEASIBILITY_TOL {
      return Err(EngineError::ConstraintInfeasible(format!(
        "minimum weights sum to {lower_sum:.4} > 1 across {n} assets"
      )));
    }

    if let Some(limit) = self.sector_limit {
      for (g, room) in self.sector_room().iter().enumerate() {
        if *room < -FEASIBILITY_TOL {
          return Err(EngineError::ConstraintInfeasible(format!(
            "minimum weights of {} assets in sector group {g} exceed the sector limit {limit}",
            self.sectors[g].len()
          )));
        }
      }
    }

    let capacity = self.max_total();
    if capacity < 1.0 - FEASIBILITY_TOL {
      return Err(EngineError::ConstraintInfeasible(format!(
        "maximum weights only reach a total of {capacity:.4} < 1"
      )));
    }

    Ok(())
  }

  /// Largest total weight reachable under the upper and sector bounds.
  fn max_total(&self) -> f64 {
    let sector_of = self.sector_of();
    let mut total: f64 = self
      .upper
      .iter()
      .enumerate()
      .filter(|(i, _)| sector_of[*i].is_none())
      .map(|(_, u)| u)
      .sum();

    if let Some(limit) = self.sector_limit {
      for g in &self.sectors {
        let uppers: f64 = g.iter().map(|&i| self.upper[i]).sum();
        total += uppers.min(limit);
      }
    }
    total
  }

  /// Greedy fill maximizing `cᵀw` over `𝒲`.
  pub fn maximize_linear(&self, c: &[f64]) -> Vec<f64> {
    let n = self.n_assets();
    let sector_of = self.sector_of();
    let mut room = self.sector_room();
    let mut w = self.lower.clone();
    let mut budget = 1.0 - w.iter().sum::<f64>();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| c[b].total_cmp(&c[a]));

    for i in order {
      if budget <= 0.0 {
        break;
      }
      let mut cap = self.upper[i] - self.lower[i];
      if let Some(g) = sector_of[i] {
        cap = cap.min(room[g].max(0.0));
      }
      let add = cap.min(budget);
      w[i] += add;
      budget -= add;
      if let Some(g) = sector_of[i] {
        room[g] -= add;
      }
    }
    w
  }

  /// `[min μᵀw, max μᵀw]` over `𝒲`.
  pub fn return_range(&self, mu: &DVector<f64>) -> (f64, f64) {
    let c: Vec<f64> = mu.iter().copied().collect();
    let neg: Vec<f64> = c.iter().map(|v| -v).collect();
    let hi = self.maximize_linear(&c);
    let lo = self.maximize_linear(&neg);
    let dot = |w: &[f64]| w.iter().zip(&c).map(|(a, b)| a * b).sum::<f64>();
    (dot(&lo), dot(&hi))
  }

  /// Euclidean projection onto `{1ᵀw = 1, ℓ ≤ w ≤ u}`.
  pub fn project_budget_box(&self, x: &DVector<f64>) -> DVector<f64> {
    let n = self.n_assets();
    let shifted_sum = |lambda: f64| -> f64 {
      (0..n)
        .map(|i| (x[i] - lambda).clamp(self.lower[i], self.upper[i]))
        .sum()
    };

    let mut lo = (0..n)
      .map(|i| x[i] - self.upper[i])
      .fold(f64::INFINITY, f64::min);
    let mut hi = (0..n)
      .map(|i| x[i] - self.lower[i])
      .fold(f64::NEG_INFINITY, f64::max);

    for _ in 0..200 {
      let mid = 0.5 * (lo + hi);
      if shifted_sum(mid) > 1.0 {
        lo = mid;
      } else {
        hi = mid;
      }
      if hi - lo <= f64::EPSILON * (1.0 + hi.abs()) {
        break;
      }
    }

    let lambda = 0.5 * (lo + hi);
    DVector::from_fn(n, |i, _| (x[i] - lambda).clamp(self.lower[i], self.upper[i]))
  }

  /// Largest violation of any constraint by `w`.
  pub fn max_violation(&self, w: &DVector<f64>) -> f64 {
    let mut worst = (w.sum() - 1.0).abs();
    for i in 0..self.n_assets() {
      worst = worst
        .max(self.lower[i] - w[i])
        .max(w[i] - self.upper[i]);
    }
    if let Some(limit) = self.sector_limit {
      for g in &self.sectors {
        let exposure: f64 = g.iter().map(|&i| w[i]).sum();
        worst = worst.max(exposure - limit);
      }
    }
    worst.max(0.0)
  }
}
