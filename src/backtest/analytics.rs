//! # Performance Analytics
//!
//! $$
//! R_{ann}=(1+R_{tot})^{P/T}-1,\qquad \sigma=s(r)\sqrt P,\qquad
//! \beta=\frac{\operatorname{Cov}(r,b)}{\operatorname{Var}(b)}
//! $$
//!
//! Summary statistics of a NAV path. Ratios with a zero denominator are 0.

use impl_new_derive::ImplNew;

use crate::error::EngineError;
use crate::error::Result;
use crate::types::NavPoint;

fn mean(xs: &[f64]) -> f64 {
  if xs.is_empty() {
    0.0
  } else {
    xs.iter().sum::<f64>() / xs.len() as f64
  }
}

/// Sample variance (ddof = 1).
fn sample_variance(xs: &[f64]) -> f64 {
  if xs.len() < 2 {
    return 0.0;
  }
  let m = mean(xs);
  xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64
}

fn sample_covariance(xs: &[f64], ys: &[f64]) -> f64 {
  if xs.len() < 2 {
    return 0.0;
  }
  let (mx, my) = (mean(xs), mean(ys));
  xs.iter()
    .zip(ys)
    .map(|(x, y)| (x - mx) * (y - my))
    .sum::<f64>()
    / (xs.len() - 1) as f64
}

fn ratio(num: f64, den: f64) -> f64 {
  if den.abs() > 1e-15 {
    num / den
  } else {
    0.0
  }
}

/// `q`-quantile with linear interpolation between order statistics.
pub fn quantile(xs: &[f64], q: f64) -> f64 {
  if xs.is_empty() {
    return 0.0;
  }
  let mut sorted = xs.to_vec();
  sorted.sort_by(|a, b| a.total_cmp(b));

  let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
  let lo = pos.floor() as usize;
  let hi = pos.ceil() as usize;
  sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Most negative `V_t / max_{s≤t} V_s - 1`.
pub fn max_drawdown(values: &[f64]) -> f64 {
  let mut peak = f64::NEG_INFINITY;
  let mut worst = 0.0_f64;
  for &v in values {
    peak = peak.max(v);
    if peak > 0.0 {
      worst = worst.min(v / peak - 1.0);
    }
  }
  worst
}

/// Compound growth over `periods`, annualized.
fn annualize(total_return: f64, periods: usize, periods_per_year: f64) -> f64 {
  let growth = 1.0 + total_return;
  if periods == 0 {
    return 0.0;
  }
  if growth <= 0.0 {
    return -1.0;
  }
  growth.powf(periods_per_year / periods as f64) - 1.0
}

/// Summary metrics of one NAV path.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerformanceMetrics {
  pub total_return: f64,
  pub annualized_return: f64,
  pub volatility: f64,
  pub sharpe_ratio: f64,
  /// Non-positive fraction.
  pub max_drawdown: f64,
  pub alpha: f64,
  pub beta: f64,
  pub sortino_ratio: f64,
  pub calmar_ratio: f64,
  /// 5th percentile of period returns.
  pub value_at_risk_95: f64,
  pub mean_return: f64,
}

/// Computes [`PerformanceMetrics`] from a NAV path and optional benchmark.
#[derive(ImplNew, Clone, Copy, Debug)]
pub struct PerformanceAnalytics {
  pub periods_per_year: f64,
  pub risk_free_rate: f64,
}

impl PerformanceAnalytics {
  /// `benchmark` holds one return per NAV period when given.
  pub fn evaluate(&self, nav: &[NavPoint], benchmark: Option<&[f64]>) -> Result<PerformanceMetrics> {
    if nav.len() < 2 {
      return Err(EngineError::Data(format!(
        "{} NAV points are not enough for performance statistics",
        nav.len()
      )));
    }

    let values: Vec<f64> = nav.iter().map(|p| p.value).collect();
    let returns: Vec<f64> = values.windows(2).map(|w| w[1] / w[0] - 1.0).collect();
    let periods = returns.len();
    let ppy = self.periods_per_year;
    let rf = self.risk_free_rate;

    let total_return = values[periods] / values[0] - 1.0;
    let annualized_return = annualize(total_return, periods, ppy);
    let volatility = sample_variance(&returns).sqrt() * ppy.sqrt();
    let sharpe_ratio = ratio(annualized_return - rf, volatility);
    let max_drawdown = max_drawdown(&values);

    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_vol = sample_variance(&downside).sqrt() * ppy.sqrt();
    let sortino_ratio = ratio(annualized_return - rf, downside_vol);
    let calmar_ratio = ratio(annualized_return, max_drawdown.abs());

    let (alpha, beta) = match benchmark {
      Some(bench) => {
        if bench.len() != periods {
          return Err(EngineError::InvalidInput(format!(
            "benchmark has {} returns for {periods} NAV periods",
            bench.len()
          )));
        }
        let beta = ratio(sample_covariance(&returns, bench), sample_variance(bench));
        let bench_total = bench.iter().fold(1.0, |acc, b| acc * (1.0 + b)) - 1.0;
        let bench_annualized = annualize(bench_total, periods, ppy);
        (annualized_return - rf - beta * (bench_annualized - rf), beta)
      }
      None => (annualized_return - rf, 0.0),
    };

    Ok(PerformanceMetrics {
      total_return,
      annualized_return,
      volatility,
      sharpe_ratio,
      max_drawdown,
      alpha,
      beta,
      sortino_ratio,
      calmar_ratio,
      value_at_risk_95: quantile(&returns, 0.05),
      mean_return: mean(&returns) * ppy,
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use approx::assert_relative_eq;

  use super::*;
  use crate::testing::business_days;
  use crate::testing::date;

  fn nav(values: &[f64]) -> Vec<NavPoint> {
    business_days(date(2024, 1, 2), values.len())
      .into_iter()
      .zip(values)
      .map(|(date, &value)| NavPoint { date, value })
      .collect()
  }

  #[test]
  fn drawdown_tracks_running_peak() {
    assert_abs_diff_eq!(max_drawdown(&[100.0, 120.0, 90.0, 130.0, 117.0]), -0.25, epsilon = 1e-12);
    assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), 0.0);
  }

  #[test]
  fn quantile_interpolates_linearly() {
    let xs = [5.0, 1.0, 3.0, 2.0, 4.0];
    assert_abs_diff_eq!(quantile(&xs, 0.0), 1.0);
    assert_abs_diff_eq!(quantile(&xs, 0.5), 3.0);
    assert_abs_diff_eq!(quantile(&xs, 0.05), 1.2, epsilon = 1e-12);
  }

  #[test]
  fn textbook_metrics() {
    let path = nav(&[100.0, 110.0, 99.0, 108.9]);
    let m = PerformanceAnalytics::new(252.0, 0.02).evaluate(&path, None).unwrap();

    let r = [0.1, -0.1, 0.1];
    let mean: f64 = 0.1 / 3.0;
    let var = r.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / 2.0;
    let ann = (1.089_f64).powf(252.0 / 3.0) - 1.0;

    assert_relative_eq!(m.total_return, 0.089, max_relative = 1e-12);
    assert_relative_eq!(m.annualized_return, ann, max_relative = 1e-10);
    assert_relative_eq!(m.volatility, var.sqrt() * 252f64.sqrt(), max_relative = 1e-12);
    assert_relative_eq!(m.sharpe_ratio, (ann - 0.02) / m.volatility, max_relative = 1e-12);
    assert_abs_diff_eq!(m.max_drawdown, -0.1, epsilon = 1e-12);
    assert_relative_eq!(m.calmar_ratio, ann / 0.1, max_relative = 1e-10);
    assert_relative_eq!(m.mean_return, mean * 252.0, max_relative = 1e-12);
    assert_eq!(m.beta, 0.0);
    assert_relative_eq!(m.alpha, ann - 0.02, max_relative = 1e-12);
    // single negative return: downside deviation undefined
    assert_eq!(m.sortino_ratio, 0.0);
  }

  #[test]
  fn downside_metrics_from_two_losses() {
    let path = nav(&[100.0, 110.0, 99.0, 94.05, 103.455]);
    let m = PerformanceAnalytics::new(252.0, 0.02).evaluate(&path, None).unwrap();

    let ann = (1.034_55_f64).powf(252.0 / 4.0) - 1.0;
    // downside returns -0.10 and -0.05: mean -0.075, ddof-1 variance 0.00125
    let downside_vol = 0.00125_f64.sqrt() * 252f64.sqrt();
    assert_relative_eq!(m.sortino_ratio, (ann - 0.02) / downside_vol, max_relative = 1e-9);
    assert!(m.sortino_ratio > m.sharpe_ratio);
    // sorted returns [-0.1, -0.05, 0.1, 0.1], position 0.05 * 3 = 0.15
    assert_abs_diff_eq!(m.value_at_risk_95, -0.1 + 0.05 * 0.15, epsilon = 1e-12);
    assert_abs_diff_eq!(m.max_drawdown, 94.05 / 110.0 - 1.0, epsilon = 1e-12);
  }

  #[test]
  fn benchmark_equal_to_portfolio_has_unit_beta_and_zero_alpha() {
    let path = nav(&[100.0, 101.0, 99.0, 102.0, 103.0]);
    let r: Vec<f64> = path.windows(2).map(|w| w[1].value / w[0].value - 1.0).collect();
    let m = PerformanceAnalytics::new(252.0, 0.01)
      .evaluate(&path, Some(&r))
      .unwrap();
    assert_abs_diff_eq!(m.beta, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(m.alpha, 0.0, epsilon = 1e-9);
  }

  #[test]
  fn flat_path_reports_zero_ratios() {
    let m = PerformanceAnalytics::new(252.0, 0.0)
      .evaluate(&nav(&[50.0, 50.0, 50.0]), None)
      .unwrap();
    assert_eq!(m.volatility, 0.0);
    assert_eq!(m.sharpe_ratio, 0.0);
    assert_eq!(m.sortino_ratio, 0.0);
    assert_eq!(m.calmar_ratio, 0.0);
  }

  #[test]
  fn mismatched_benchmark_is_rejected() {
    let err = PerformanceAnalytics::new(252.0, 0.0)
      .evaluate(&nav(&[1.0, 1.1, 1.2]), Some(&[0.0]))
      .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
  }

  #[test]
  fn needs_two_points() {
    assert!(PerformanceAnalytics::new(252.0, 0.0)
      .evaluate(&nav(&[1.0]), None)
      .is_err());
  }
}
