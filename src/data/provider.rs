//! # Price History Provider
//!
//! $$
//! \text{get\_series}:(\text{tickers},t_0,t_1)\mapsto\{(t,P_t,D_t,S_t)\}
//! $$
//!
//! Contract of the market-data collaborator plus an in-memory implementation.

use std::collections::HashMap;
use std::io::Read;

use chrono::NaiveDate;

use crate::error::EngineError;
use crate::error::Result;
use crate::types::PriceSeries;

/// Source of daily adjusted close, dividend and split series.
pub trait PriceHistoryProvider: Send + Sync {
  /// Series for `tickers` restricted to `[start, end]`, in the requested order.
  fn get_series(
    &self,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<Vec<PriceSeries>>;
}

/// Read-only snapshot of price histories keyed by ticker.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPriceHistory {
  series: HashMap<String, PriceSeries>,
}

impl InMemoryPriceHistory {
  pub fn new(series: Vec<PriceSeries>) -> Self {
    let mut out = Self::default();
    for s in series {
      out.insert(s);
    }
    out
  }

  /// Add or replace the history of one ticker.
  pub fn insert(&mut self, series: PriceSeries) {
    self.series.insert(series.ticker().to_string(), series);
  }

  /// Parse a JSON array of `{ticker, points: [{date, adjustedClose, dividend?, splitFactor?}]}`.
  pub fn from_json_str(json: &str) -> Result<Self> {
    let series: Vec<PriceSeries> = serde_json::from_str(json)
      .map_err(|e| EngineError::Data(format!("invalid price history JSON: {e}")))?;
    Ok(Self::new(series))
  }

  pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
    let series: Vec<PriceSeries> = serde_json::from_reader(reader)
      .map_err(|e| EngineError::Data(format!("invalid price history JSON: {e}")))?;
    Ok(Self::new(series))
  }

  pub fn tickers(&self) -> Vec<&str> {
    let mut out: Vec<&str> = self.series.keys().map(String::as_str).collect();
    out.sort_unstable();
    out
  }

  pub fn len(&self) -> usize {
    self.series.len()
  }

  pub fn is_empty(&self) -> bool {
    self.series.is_empty()
  }
}

impl PriceHistoryProvider for InMemoryPriceHistory {
  fn get_series(
    &self,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
  ) -> Result<Vec<PriceSeries>> {
    if start > end {
      return Err(EngineError::InvalidInput(format!(
        "start date {start} is after end date {end}"
      )));
    }

    tickers
      .iter()
      .map(|ticker| {
        let series = self
          .series
          .get(ticker)
          .ok_or_else(|| EngineError::Data(format!("no price history for {ticker}")))?;
        let window = series.window(start, end);
        if window.is_empty() {
          return Err(EngineError::Data(format!(
            "no prices for {ticker} between {start} and {end}"
          )));
        }
        Ok(window)
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const JSON: &str = r#"[
    {"ticker": "AAA", "points": [
      {"date": "2024-01-02", "adjustedClose": 10.0},
      {"date": "2024-01-03", "adjustedClose": 10.5, "dividend": 0.1},
      {"date": "2024-01-04", "adjustedClose": 5.4, "splitFactor": 2.0}
    ]}
  ]"#;

  fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
  }

  #[test]
  fn loads_json_with_defaults() {
    let provider = InMemoryPriceHistory::from_json_str(JSON).unwrap();
    let series = provider
      .get_series(&["AAA".to_string()], d(2024, 1, 1), d(2024, 1, 31))
      .unwrap();

    let points = series[0].points();
    assert_eq!(points.len(), 3);
    assert_eq!(points[0].dividend, 0.0);
    assert_eq!(points[0].split_factor, 1.0);
    assert_eq!(points[2].split_factor, 2.0);
  }

  #[test]
  fn window_filters_dates() {
    let provider = InMemoryPriceHistory::from_json_str(JSON).unwrap();
    let series = provider
      .get_series(&["AAA".to_string()], d(2024, 1, 3), d(2024, 1, 3))
      .unwrap();
    assert_eq!(series[0].len(), 1);
  }

  #[test]
  fn missing_ticker_is_a_data_error() {
    let provider = InMemoryPriceHistory::from_json_str(JSON).unwrap();
    let err = provider
      .get_series(&["ZZZ".to_string()], d(2024, 1, 1), d(2024, 1, 31))
      .unwrap_err();
    assert!(matches!(err, EngineError::Data(_)));
  }

  #[test]
  fn unordered_json_is_rejected() {
    let json = r#"[{"ticker": "AAA", "points": [
      {"date": "2024-01-03", "adjustedClose": 10.0},
      {"date": "2024-01-02", "adjustedClose": 10.5}
    ]}]"#;
    assert!(InMemoryPriceHistory::from_json_str(json).is_err());
  }
}
