//! # Return Series Builder
//!
//! $$
//! \mathrm{TR}_t=\mathrm{TR}_{t-1}\,\frac{\tilde P_t+\tilde D_t}{\tilde P_{t-1}},\qquad
//! \tilde P_t=\frac{P_t}{\prod_{s>t}S_s}
//! $$
//!
//! Calendar intersection, split and dividend adjustment, and periodic simple returns.

use std::collections::BTreeSet;
use std::collections::HashMap;

use chrono::Datelike;
use chrono::NaiveDate;
use chrono::Weekday;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;

use crate::error::EngineError;
use crate::error::Result;
use crate::types::PriceSeries;

/// Convert a price level path to simple returns.
pub fn simple_returns(levels: &[f64]) -> Vec<f64> {
  levels.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

/// Weekdays in `[start, end]`, the trading days a full history would be expected to cover.
fn weekdays(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
  start
    .iter_days()
    .take_while(move |d| *d <= end)
    .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
}

/// Aligned per-ticker return series over a shared calendar.
///
/// `returns[(t, i)]` is the return of ticker `i` from `calendar[t]` to `calendar[t + 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnPanel {
  tickers: Vec<String>,
  calendar: Vec<NaiveDate>,
  returns: Array2<f64>,
}

impl ReturnPanel {
  /// Wrap an already aligned `(periods x assets)` return matrix.
  pub fn new(tickers: Vec<String>, calendar: Vec<NaiveDate>, returns: Array2<f64>) -> Result<Self> {
    if returns.ncols() != tickers.len() {
      return Err(EngineError::Data(format!(
        "return matrix has {} columns for {} tickers",
        returns.ncols(),
        tickers.len()
      )));
    }
    if calendar.len() != returns.nrows() + 1 {
      return Err(EngineError::Data(format!(
        "calendar of {} dates does not frame {} return periods",
        calendar.len(),
        returns.nrows()
      )));
    }
    if returns.nrows() == 0 {
      return Err(EngineError::Data("return panel has no periods".into()));
    }
    if returns.iter().any(|r| !r.is_finite()) {
      return Err(EngineError::Data("return panel contains NaN or Inf".into()));
    }

    Ok(Self {
      tickers,
      calendar,
      returns,
    })
  }

  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  /// All common dates, including the base date preceding the first return.
  pub fn calendar(&self) -> &[NaiveDate] {
    &self.calendar
  }

  /// End date of each return period.
  pub fn return_dates(&self) -> &[NaiveDate] {
    &self.calendar[1..]
  }

  pub fn returns(&self) -> &Array2<f64> {
    &self.returns
  }

  pub fn n_assets(&self) -> usize {
    self.returns.ncols()
  }

  pub fn n_periods(&self) -> usize {
    self.returns.nrows()
  }

  pub fn column(&self, i: usize) -> ArrayView1<'_, f64> {
    self.returns.column(i)
  }

  pub fn index_of(&self, ticker: &str) -> Option<usize> {
    self.tickers.iter().position(|t| t == ticker)
  }

  /// Return series of a single ticker.
  pub fn series(&self, ticker: &str) -> Option<Vec<f64>> {
    self.index_of(ticker).map(|i| self.column(i).to_vec())
  }

  /// Panel restricted to `tickers`, in that order.
  pub fn select(&self, tickers: &[String]) -> Result<ReturnPanel> {
    let idx = tickers
      .iter()
      .map(|t| {
        self
          .index_of(t)
          .ok_or_else(|| EngineError::Data(format!("{t} is not part of the return panel")))
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(ReturnPanel {
      tickers: tickers.to_vec(),
      calendar: self.calendar.clone(),
      returns: self.returns.select(Axis(1), &idx),
    })
  }
}

/// Builds a [`ReturnPanel`] from raw price histories.
#[derive(Clone, Copy, Debug)]
pub struct ReturnSeriesBuilder {
  /// Reinvest dividends into a total-return index.
  pub include_dividends: bool,
  /// Remove split discontinuities from raw prices.
  pub account_for_splits: bool,
  /// Minimum share of the requested range the common calendar must keep.
  pub min_coverage: f64,
}

impl Default for ReturnSeriesBuilder {
  fn default() -> Self {
    Self {
      include_dividends: true,
      account_for_splits: true,
      min_coverage: 0.6,
    }
  }
}

impl ReturnSeriesBuilder {
  pub fn new(include_dividends: bool, account_for_splits: bool, min_coverage: f64) -> Self {
    Self {
      include_dividends,
      account_for_splits,
      min_coverage,
    }
  }

  /// Align `series` on their common calendar within `[start, end]` and compute returns.
  pub fn build(&self, series: &[PriceSeries], start: NaiveDate, end: NaiveDate) -> Result<ReturnPanel> {
    if series.is_empty() {
      return Err(EngineError::Data("no price series supplied".into()));
    }

    let windows: Vec<PriceSeries> = series.iter().map(|s| s.window(start, end)).collect();
    if let Some(empty) = windows.iter().find(|w| w.is_empty()) {
      return Err(EngineError::Data(format!(
        "{} has no prices between {start} and {end}",
        empty.ticker()
      )));
    }

    // Reference calendar: every weekday of the range plus any other date a ticker traded on.
    let mut observed: BTreeSet<NaiveDate> = weekdays(start, end).collect();
    for w in &windows {
      observed.extend(w.points().iter().map(|p| p.date));
    }

    let mut common: BTreeSet<NaiveDate> = windows[0].points().iter().map(|p| p.date).collect();
    for w in &windows[1..] {
      let dates: BTreeSet<NaiveDate> = w.points().iter().map(|p| p.date).collect();
      common = common.intersection(&dates).copied().collect();
    }

    if common.len() < 2 {
      return Err(EngineError::Data(format!(
        "common calendar has {} dates, at least 2 are required",
        common.len()
      )));
    }

    let coverage = common.len() as f64 / observed.len() as f64;
    if coverage < self.min_coverage {
      return Err(EngineError::Data(format!(
        "common calendar covers {:.1}% of the requested range, {:.1}% required",
        coverage * 100.0,
        self.min_coverage * 100.0
      )));
    }

    let calendar: Vec<NaiveDate> = common.into_iter().collect();
    let n_periods = calendar.len() - 1;
    let mut returns = Array2::<f64>::zeros((n_periods, windows.len()));

    for (i, w) in windows.iter().enumerate() {
      let levels = self.levels(w);
      let by_date: HashMap<NaiveDate, f64> = w
        .points()
        .iter()
        .map(|p| p.date)
        .zip(levels)
        .collect();

      let sampled: Vec<f64> = calendar.iter().map(|d| by_date[d]).collect();
      for (t, r) in simple_returns(&sampled).into_iter().enumerate() {
        if !r.is_finite() {
          return Err(EngineError::Data(format!(
            "{}: non-finite return on {}",
            w.ticker(),
            calendar[t + 1]
          )));
        }
        returns[(t, i)] = r;
      }
    }

    tracing::debug!(
      tickers = windows.len(),
      periods = n_periods,
      coverage,
      "aligned return panel"
    );

    ReturnPanel::new(
      windows.iter().map(|w| w.ticker().to_string()).collect(),
      calendar,
      returns,
    )
  }

  /// Adjusted price level of one series on its own calendar.
  fn levels(&self, series: &PriceSeries) -> Vec<f64> {
    let points = series.points();
    let n = points.len();

    let mut split_divisor = vec![1.0; n];
    if self.account_for_splits {
      let mut cum = 1.0;
      for i in (0..n).rev() {
        split_divisor[i] = cum;
        cum *= points[i].split_factor;
      }
    }

    let prices: Vec<f64> = points
      .iter()
      .zip(&split_divisor)
      .map(|(p, s)| p.adjusted_close / s)
      .collect();

    if !self.include_dividends {
      return prices;
    }

    let mut levels = Vec::with_capacity(n);
    levels.push(prices[0]);
    for i in 1..n {
      let dividend = points[i].dividend / split_divisor[i];
      let growth = (prices[i] + dividend) / prices[i - 1];
      levels.push(levels[i - 1] * growth);
    }
    levels
  }
}
