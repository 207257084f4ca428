//! Deterministic synthetic market data shared by unit tests.

use chrono::Datelike;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::Weekday;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::Normal;

use crate::data::InMemoryPriceHistory;
use crate::types::PricePoint;
use crate::types::PriceSeries;

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `n` consecutive weekdays starting at `start` (inclusive if a weekday).
pub(crate) fn business_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
  let mut out = Vec::with_capacity(n);
  let mut d = start;
  while out.len() < n {
    if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
      out.push(d);
    }
    d += Duration::days(1);
  }
  out
}

pub(crate) fn series_from_prices(ticker: &str, dates: &[NaiveDate], prices: &[f64]) -> PriceSeries {
  let points = dates
    .iter()
    .zip(prices)
    .map(|(&d, &p)| PricePoint::new(d, p, 0.0, 1.0))
    .collect();
  PriceSeries::new(ticker, points).unwrap()
}

/// Price path starting at 100 that realizes `returns` exactly.
pub(crate) fn series_from_returns(ticker: &str, dates: &[NaiveDate], returns: &[f64]) -> PriceSeries {
  assert_eq!(dates.len(), returns.len() + 1);
  let mut prices = Vec::with_capacity(dates.len());
  prices.push(100.0);
  for r in returns {
    let last = *prices.last().unwrap();
    prices.push(last * (1.0 + r));
  }
  series_from_prices(ticker, dates, &prices)
}

/// Independent Gaussian daily returns per asset, seeded.
pub(crate) fn gaussian_returns(seed: u64, means: &[f64], vols: &[f64], periods: usize) -> Vec<Vec<f64>> {
  let mut rng = StdRng::seed_from_u64(seed);
  means
    .iter()
    .zip(vols)
    .map(|(&m, &s)| {
      let dist = Normal::new(m, s).unwrap();
      (0..periods).map(|_| dist.sample(&mut rng)).collect()
    })
    .collect()
}

/// Provider holding one series per `(ticker, returns)` pair over a weekday calendar.
pub(crate) fn provider_from_returns(
  start: NaiveDate,
  tickers: &[&str],
  returns: &[Vec<f64>],
) -> (InMemoryPriceHistory, Vec<NaiveDate>) {
  let periods = returns[0].len();
  let dates = business_days(start, periods + 1);
  let series = tickers
    .iter()
    .zip(returns)
    .map(|(t, r)| series_from_returns(t, &dates, r))
    .collect();
  (InMemoryPriceHistory::new(series), dates)
}

/// Sample mean and covariance (ddof = 1) of column-wise series, annualized.
pub(crate) fn annualized_moments(returns: &[Vec<f64>], periods_per_year: f64) -> (Vec<f64>, Vec<Vec<f64>>) {
  let n = returns.len();
  let t = returns[0].len() as f64;
  let means: Vec<f64> = returns.iter().map(|r| r.iter().sum::<f64>() / t).collect();
  let mut cov = vec![vec![0.0; n]; n];
  for i in 0..n {
    for j in 0..n {
      let c: f64 = returns[i]
        .iter()
        .zip(&returns[j])
        .map(|(a, b)| (a - means[i]) * (b - means[j]))
        .sum();
      cov[i][j] = c / (t - 1.0) * periods_per_year;
    }
  }
  (means.iter().map(|m| m * periods_per_year).collect(), cov)
}
