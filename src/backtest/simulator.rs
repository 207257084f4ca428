//! # Backtest Simulator
//!
//! $$
//! V_t=V_{t-1}\big(1+h_{t-1}^\top r_t\big),\qquad
//! h_t=\frac{h_{t-1}\odot(1+r_t)}{1+h_{t-1}^\top r_t}
//! $$
//!
//! On a rebalance date the holdings reset to the target and
//! `c\,V_t\cdot\tfrac12\lVert w-h_t\rVert_1` is charged.

use chrono::Datelike;
use chrono::NaiveDate;
use impl_new_derive::ImplNew;

use crate::data::ReturnPanel;
use crate::deadline::Deadline;
use crate::error::EngineError;
use crate::error::Result;
use crate::types::NavPoint;
use crate::types::RebalancingFrequency;

/// Calendar bucket of `date`; a rebalance happens whenever it changes.
fn bucket(date: NaiveDate, frequency: RebalancingFrequency) -> Option<(i32, u32)> {
  let month = date.month0();
  match frequency {
    RebalancingFrequency::Monthly => Some((date.year(), month)),
    RebalancingFrequency::Quarterly => Some((date.year(), month / 3)),
    RebalancingFrequency::SemiAnnually => Some((date.year(), month / 6)),
    RebalancingFrequency::Annually => Some((date.year(), 0)),
    RebalancingFrequency::Never => None,
  }
}

/// Replays a target allocation over a return panel.
#[derive(ImplNew, Clone, Copy, Debug)]
pub struct BacktestSimulator {
  pub initial_investment: f64,
  /// Cost per unit of traded value.
  pub transaction_cost_rate: f64,
  pub frequency: RebalancingFrequency,
}

/// NAV path and trading bookkeeping of one run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Simulation {
  /// First point is the first calendar date at the initial investment.
  pub nav: Vec<NavPoint>,
  pub rebalance_count: usize,
  pub total_cost: f64,
  /// Sum of one-way turnover over all rebalances.
  pub total_turnover: f64,
}

impl Simulation {
  /// Period returns of the NAV path.
  pub fn returns(&self) -> Vec<f64> {
    self
      .nav
      .windows(2)
      .map(|w| w[1].value / w[0].value - 1.0)
      .collect()
  }

  pub fn final_value(&self) -> Option<f64> {
    self.nav.last().map(|p| p.value)
  }
}

struct State {
  held: Vec<f64>,
  nav: f64,
  last_rebalance: NaiveDate,
}

impl BacktestSimulator {
  fn validate(&self, panel: &ReturnPanel, target: &[f64]) -> Result<()> {
    if !self.initial_investment.is_finite() || self.initial_investment <= 0.0 {
      return Err(EngineError::InvalidInput(format!(
        "initial investment must be positive, got {}",
        self.initial_investment
      )));
    }
    if !(0.0..1.0).contains(&self.transaction_cost_rate) {
      return Err(EngineError::InvalidInput(format!(
        "transaction cost rate must lie in [0, 1), got {}",
        self.transaction_cost_rate
      )));
    }
    if target.len() != panel.n_assets() {
      return Err(EngineError::InvalidInput(format!(
        "{} target weights for {} assets",
        target.len(),
        panel.n_assets()
      )));
    }
    Ok(())
  }

  /// Run `target` over every period of `panel`.
  pub fn run(&self, panel: &ReturnPanel, target: &[f64], deadline: &Deadline) -> Result<Simulation> {
    self.validate(panel, target)?;

    let calendar = panel.calendar();
    let returns = panel.returns();
    let start = calendar[0];

    let mut state = State {
      held: target.to_vec(),
      nav: self.initial_investment,
      last_rebalance: start,
    };
    let mut out = Simulation {
      nav: Vec::with_capacity(calendar.len()),
      ..Default::default()
    };
    out.nav.push(NavPoint {
      date: start,
      value: state.nav,
    });

    for (t, &date) in panel.return_dates().iter().enumerate() {
      deadline.check()?;

      let r = returns.row(t);
      let growth = 1.0 + state.held.iter().zip(r.iter()).map(|(h, x)| h * x).sum::<f64>();
      if !growth.is_finite() || growth <= 0.0 {
        return Err(EngineError::Numerical(format!(
          "portfolio value wiped out on {date}"
        )));
      }

      state.nav *= growth;
      for (h, x) in state.held.iter_mut().zip(r.iter()) {
        *h *= (1.0 + x) / growth;
      }

      if let Some(b) = bucket(date, self.frequency) {
        if bucket(state.last_rebalance, self.frequency) != Some(b) {
          let turnover = 0.5
            * target
              .iter()
              .zip(&state.held)
              .map(|(w, h)| (w - h).abs())
              .sum::<f64>();
          let cost = turnover * self.transaction_cost_rate * state.nav;

          state.nav -= cost;
          state.held.copy_from_slice(target);
          state.last_rebalance = date;

          out.rebalance_count += 1;
          out.total_cost += cost;
          out.total_turnover += turnover;
          tracing::debug!(%date, turnover, cost, nav = state.nav, "rebalanced");
        }
      }

      out.nav.push(NavPoint {
        date,
        value: state.nav,
      });
    }

    Ok(out)
  }
}
