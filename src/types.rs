//! # Types
//!
//! $$
//! \mathbf{w}\in\mathbb R^n,\quad \mathbf 1^\top\mathbf{w}=1,\quad \ell_i\le w_i\le u_i
//! $$
//!
//! Request inputs and result containers. Inputs validate their invariants on
//! construction so downstream components never re-check shapes.

use std::collections::HashSet;
use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDate;
use impl_new_derive::ImplNew;
use serde::Deserialize;
use serde::Serialize;

use crate::error::EngineError;
use crate::error::Result;

/// Tolerance on `sum(weights) = 1` for caller-supplied portfolios.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

fn default_split_factor() -> f64 {
  1.0
}

/// One daily observation of a ticker.
#[derive(ImplNew, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
  /// Trading date.
  pub date: NaiveDate,
  /// Adjusted close price.
  pub adjusted_close: f64,
  /// Cash dividend going ex on this date.
  #[serde(default)]
  pub dividend: f64,
  /// Split ratio effective on this date (2.0 for a 2:1 split, 1.0 otherwise).
  #[serde(default = "default_split_factor")]
  pub split_factor: f64,
}

#[derive(Deserialize)]
struct RawPriceSeries {
  ticker: String,
  points: Vec<PricePoint>,
}

/// Price history of a single ticker with strictly increasing dates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPriceSeries")]
pub struct PriceSeries {
  ticker: String,
  points: Vec<PricePoint>,
}

impl TryFrom<RawPriceSeries> for PriceSeries {
  type Error = EngineError;

  fn try_from(raw: RawPriceSeries) -> Result<Self> {
    PriceSeries::new(raw.ticker, raw.points)
  }
}

impl PriceSeries {
  pub fn new(ticker: impl Into<String>, points: Vec<PricePoint>) -> Result<Self> {
    let ticker = ticker.into();
    for pair in points.windows(2) {
      if pair[1].date <= pair[0].date {
        return Err(EngineError::Data(format!(
          "{ticker}: dates must be strictly increasing ({} then {})",
          pair[0].date, pair[1].date
        )));
      }
    }
    for p in &points {
      if !(p.adjusted_close.is_finite() && p.adjusted_close > 0.0) {
        return Err(EngineError::Data(format!(
          "{ticker}: non-positive or non-finite close on {}",
          p.date
        )));
      }
      if !(p.dividend.is_finite() && p.dividend >= 0.0) {
        return Err(EngineError::Data(format!(
          "{ticker}: invalid dividend on {}",
          p.date
        )));
      }
      if !(p.split_factor.is_finite() && p.split_factor > 0.0) {
        return Err(EngineError::Data(format!(
          "{ticker}: invalid split factor on {}",
          p.date
        )));
      }
    }

    Ok(Self { ticker, points })
  }

  pub fn ticker(&self) -> &str {
    &self.ticker
  }

  pub fn points(&self) -> &[PricePoint] {
    &self.points
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  /// Copy restricted to `[start, end]`.
  pub fn window(&self, start: NaiveDate, end: NaiveDate) -> PriceSeries {
    PriceSeries {
      ticker: self.ticker.clone(),
      points: self
        .points
        .iter()
        .filter(|p| p.date >= start && p.date <= end)
        .copied()
        .collect(),
    }
  }
}

/// A ticker and its target weight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Holding {
  pub ticker: String,
  pub weight: f64,
  /// Sector used by the sector exposure limit.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sector: Option<String>,
}

impl Holding {
  pub fn new(ticker: impl Into<String>, weight: f64) -> Self {
    Self {
      ticker: ticker.into(),
      weight,
      sector: None,
    }
  }

  pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
    self.sector = Some(sector.into());
    self
  }
}

/// Ordered set of holdings whose weights sum to one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Holding>", into = "Vec<Holding>")]
pub struct Portfolio {
  holdings: Vec<Holding>,
}

impl TryFrom<Vec<Holding>> for Portfolio {
  type Error = EngineError;

  fn try_from(holdings: Vec<Holding>) -> Result<Self> {
    Portfolio::new(holdings)
  }
}

impl From<Portfolio> for Vec<Holding> {
  fn from(portfolio: Portfolio) -> Self {
    portfolio.holdings
  }
}

impl Portfolio {
  pub fn new(holdings: Vec<Holding>) -> Result<Self> {
    if holdings.is_empty() {
      return Err(EngineError::InvalidInput(
        "portfolio must hold at least one ticker".into(),
      ));
    }

    let mut seen = HashSet::with_capacity(holdings.len());
    for h in &holdings {
      if !seen.insert(h.ticker.as_str()) {
        return Err(EngineError::InvalidInput(format!(
          "duplicate ticker {} in portfolio",
          h.ticker
        )));
      }
      if !h.weight.is_finite() {
        return Err(EngineError::InvalidInput(format!(
          "non-finite weight for {}",
          h.ticker
        )));
      }
    }

    let total: f64 = holdings.iter().map(|h| h.weight).sum();
    if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
      return Err(EngineError::InvalidInput(format!(
        "portfolio weights sum to {total}, expected 1"
      )));
    }

    Ok(Self { holdings })
  }

  /// Build from percent weights as entered in the dashboard (`40.0` = 40%).
  pub fn from_percent(holdings: Vec<Holding>) -> Result<Self> {
    Self::new(
      holdings
        .into_iter()
        .map(|h| Holding {
          weight: h.weight / 100.0,
          ..h
        })
        .collect(),
    )
  }

  /// Equal-weight portfolio over `tickers`.
  pub fn equal_weight<S: AsRef<str>>(tickers: &[S]) -> Result<Self> {
    let n = tickers.len().max(1) as f64;
    Self::new(
      tickers
        .iter()
        .map(|t| Holding::new(t.as_ref(), 1.0 / n))
        .collect(),
    )
  }

  pub fn holdings(&self) -> &[Holding] {
    &self.holdings
  }

  pub fn len(&self) -> usize {
    self.holdings.len()
  }

  pub fn is_empty(&self) -> bool {
    self.holdings.is_empty()
  }

  pub fn tickers(&self) -> Vec<String> {
    self.holdings.iter().map(|h| h.ticker.clone()).collect()
  }

  pub fn weights(&self) -> Vec<f64> {
    self.holdings.iter().map(|h| h.weight).collect()
  }

  pub fn sectors(&self) -> Vec<Option<String>> {
    self.holdings.iter().map(|h| h.sector.clone()).collect()
  }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConstraints {
  #[serde(default = "default_max_weight")]
  max_weight: f64,
  #[serde(default)]
  min_weight: Option<f64>,
  #[serde(default)]
  sector_limit: Option<f64>,
  #[serde(default = "default_long_only")]
  long_only: bool,
}

fn default_max_weight() -> f64 {
  1.0
}

fn default_long_only() -> bool {
  true
}

/// Per-request weight constraints.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConstraints", rename_all = "camelCase")]
pub struct Constraints {
  max_weight: f64,
  min_weight: Option<f64>,
  sector_limit: Option<f64>,
  long_only: bool,
}

impl TryFrom<RawConstraints> for Constraints {
  type Error = EngineError;

  fn try_from(raw: RawConstraints) -> Result<Self> {
    Constraints::new(raw.max_weight, raw.min_weight, raw.sector_limit, raw.long_only)
  }
}

impl Default for Constraints {
  fn default() -> Self {
    Self {
      max_weight: 1.0,
      min_weight: None,
      sector_limit: None,
      long_only: true,
    }
  }
}

impl Constraints {
  pub fn new(
    max_weight: f64,
    min_weight: Option<f64>,
    sector_limit: Option<f64>,
    long_only: bool,
  ) -> Result<Self> {
    if !(max_weight.is_finite() && max_weight > 0.0 && max_weight <= 1.0) {
      return Err(EngineError::InvalidInput(format!(
        "maxWeight must lie in (0, 1], got {max_weight}"
      )));
    }
    if let Some(min) = min_weight {
      if !(min.is_finite() && min >= 0.0 && min <= max_weight) {
        return Err(EngineError::InvalidInput(format!(
          "minWeight must lie in [0, maxWeight], got {min}"
        )));
      }
    }
    if let Some(limit) = sector_limit {
      if !(limit.is_finite() && limit > 0.0 && limit <= 1.0) {
        return Err(EngineError::InvalidInput(format!(
          "sectorLimit must lie in (0, 1], got {limit}"
        )));
      }
    }

    Ok(Self {
      max_weight,
      min_weight,
      sector_limit,
      long_only,
    })
  }

  pub fn max_weight(&self) -> f64 {
    self.max_weight
  }

  pub fn min_weight(&self) -> Option<f64> {
    self.min_weight
  }

  pub fn sector_limit(&self) -> Option<f64> {
    self.sector_limit
  }

  pub fn long_only(&self) -> bool {
    self.long_only
  }

  /// Effective per-asset lower bound: the explicit minimum, else zero for
  /// long-only books, else a short limit mirroring `max_weight`.
  pub fn lower_bound(&self) -> f64 {
    match (self.min_weight, self.long_only) {
      (Some(min), _) => min,
      (None, true) => 0.0,
      (None, false) => -self.max_weight,
    }
  }
}

/// Optimization objective.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
  /// Maximum Sharpe ratio.
  #[default]
  Sharpe,
  /// Minimum variance.
  Variance,
  /// Minimum variance at a target return.
  Return,
  /// Maximum return at a target volatility.
  Risk,
}

impl FromStr for Objective {
  type Err = EngineError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().as_str() {
      "sharpe" | "max-sharpe" => Ok(Self::Sharpe),
      "variance" | "min-variance" => Ok(Self::Variance),
      "return" => Ok(Self::Return),
      "risk" => Ok(Self::Risk),
      other => Err(EngineError::InvalidInput(format!(
        "unknown objective '{other}'"
      ))),
    }
  }
}

/// Optimization method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
  /// Mean-variance on sample moments.
  #[default]
  Markowitz,
  /// Mean-variance on Black-Litterman posterior moments.
  BlackLitterman,
  /// Equal (or budgeted) risk contributions.
  RiskParity,
}

impl FromStr for Method {
  type Err = EngineError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().as_str() {
      "markowitz" | "mean-variance" => Ok(Self::Markowitz),
      "black_litterman" | "black-litterman" | "bl" => Ok(Self::BlackLitterman),
      "risk_parity" | "risk-parity" | "riskparity" => Ok(Self::RiskParity),
      other => Err(EngineError::InvalidInput(format!("unknown method '{other}'"))),
    }
  }
}

/// How often a backtest resets holdings to the target weights.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebalancingFrequency {
  Monthly,
  #[default]
  Quarterly,
  SemiAnnually,
  Annually,
  Never,
}

impl FromStr for RebalancingFrequency {
  type Err = EngineError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().as_str() {
      "monthly" => Ok(Self::Monthly),
      "quarterly" => Ok(Self::Quarterly),
      "semi-annually" | "semiannually" | "semi_annually" => Ok(Self::SemiAnnually),
      "annually" | "yearly" => Ok(Self::Annually),
      "never" => Ok(Self::Never),
      other => Err(EngineError::InvalidInput(format!(
        "unknown rebalancing frequency '{other}'"
      ))),
    }
  }
}

impl Display for RebalancingFrequency {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RebalancingFrequency::Monthly => write!(f, "monthly"),
      RebalancingFrequency::Quarterly => write!(f, "quarterly"),
      RebalancingFrequency::SemiAnnually => write!(f, "semi-annually"),
      RebalancingFrequency::Annually => write!(f, "annually"),
      RebalancingFrequency::Never => write!(f, "never"),
    }
  }
}

/// Weight assigned to one ticker in a result.
#[derive(ImplNew, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
  pub ticker: String,
  pub weight: f64,
}

/// One (risk, return) point of the efficient frontier.
#[derive(ImplNew, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
  /// Annualized volatility.
  pub risk: f64,
  /// Annualized expected return.
  #[serde(rename = "return")]
  pub ret: f64,
}

/// Output of an optimize request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
  pub weights: Vec<WeightEntry>,
  pub expected_return: f64,
  pub volatility: f64,
  pub sharpe_ratio: f64,
  pub efficient_frontier: Vec<FrontierPoint>,
}

impl OptimizationResult {
  pub fn weight_of(&self, ticker: &str) -> Option<f64> {
    self
      .weights
      .iter()
      .find(|w| w.ticker == ticker)
      .map(|w| w.weight)
  }

  /// Optimized weights as a portfolio, e.g. to feed a backtest.
  pub fn to_portfolio(&self) -> Result<Portfolio> {
    Portfolio::new(
      self
        .weights
        .iter()
        .map(|w| Holding::new(w.ticker.clone(), w.weight))
        .collect(),
    )
  }
}

/// Net asset value on one date.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavPoint {
  pub date: NaiveDate,
  pub value: f64,
}

/// Output of a backtest request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
  pub total_return: f64,
  pub annualized_return: f64,
  pub volatility: f64,
  pub sharpe_ratio: f64,
  pub max_drawdown: f64,
  pub alpha: f64,
  pub beta: f64,
  pub performance_data: Vec<NavPoint>,
  pub sortino_ratio: f64,
  pub calmar_ratio: f64,
  #[serde(rename = "var95")]
  pub value_at_risk_95: f64,
  /// Arithmetic mean period return, annualized.
  pub mean_return: f64,
  pub rebalance_count: usize,
  pub total_transaction_cost: f64,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
  }

  #[test]
  fn price_series_rejects_unordered_dates() {
    let points = vec![
      PricePoint::new(d(2024, 1, 3), 10.0, 0.0, 1.0),
      PricePoint::new(d(2024, 1, 2), 10.0, 0.0, 1.0),
    ];
    assert!(matches!(
      PriceSeries::new("AAA", points),
      Err(EngineError::Data(_))
    ));
  }

  #[test]
  fn price_series_rejects_duplicate_dates() {
    let points = vec![
      PricePoint::new(d(2024, 1, 2), 10.0, 0.0, 1.0),
      PricePoint::new(d(2024, 1, 2), 11.0, 0.0, 1.0),
    ];
    assert!(PriceSeries::new("AAA", points).is_err());
  }

  #[test]
  fn portfolio_checks_weight_sum() {
    let bad = Portfolio::new(vec![Holding::new("A", 0.5), Holding::new("B", 0.4)]);
    assert!(matches!(bad, Err(EngineError::InvalidInput(_))));

    let ok = Portfolio::from_percent(vec![Holding::new("A", 60.0), Holding::new("B", 40.0)])
      .unwrap();
    assert_eq!(ok.weights(), vec![0.6, 0.4]);
  }

  #[test]
  fn portfolio_rejects_duplicates() {
    let dup = Portfolio::new(vec![Holding::new("A", 0.5), Holding::new("A", 0.5)]);
    assert!(dup.is_err());
  }

  #[test]
  fn constraints_validate_ordering() {
    assert!(Constraints::new(0.3, Some(0.4), None, true).is_err());
    assert!(Constraints::new(1.2, None, None, true).is_err());
    let c = Constraints::new(0.4, None, Some(0.5), false).unwrap();
    assert_eq!(c.lower_bound(), -0.4);
  }

  #[test]
  fn constraints_deserialize_from_dashboard_shape() {
    let c: Constraints = serde_json::from_str(
      r#"{"maxWeight":0.4,"minWeight":0.05,"sectorLimit":0.5,"longOnly":true}"#,
    )
    .unwrap();
    assert_eq!(c.min_weight(), Some(0.05));
    assert_eq!(c.lower_bound(), 0.05);

    let bad = serde_json::from_str::<Constraints>(r#"{"maxWeight":0.2,"minWeight":0.3}"#);
    assert!(bad.is_err());
  }

  #[test]
  fn enums_parse_dashboard_strings() {
    assert_eq!("black_litterman".parse::<Method>().unwrap(), Method::BlackLitterman);
    assert_eq!("Sharpe".parse::<Objective>().unwrap(), Objective::Sharpe);
    assert_eq!(
      "semi-annually".parse::<RebalancingFrequency>().unwrap(),
      RebalancingFrequency::SemiAnnually
    );
    assert!("weekly".parse::<RebalancingFrequency>().is_err());
  }

  #[test]
  fn frontier_point_serializes_return_field() {
    let json = serde_json::to_string(&FrontierPoint::new(0.2, 0.1)).unwrap();
    assert_eq!(json, r#"{"risk":0.2,"return":0.1}"#);
  }
}
