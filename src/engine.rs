//! # Portfolio Engine
//!
//! $$
//! \text{prices}\xrightarrow{\ \text{returns}\ }(\mu,\Sigma)\xrightarrow{\ \text{optimize}\ }\mathbf{w}^\*
//! \qquad
//! \text{prices}\xrightarrow{\ \text{replay}\ }V_{0..T}\xrightarrow{\ \text{analytics}\ }\text{metrics}
//! $$
//!
//! Request-level entry points: every call is independent and holds no state
//! besides the immutable configuration.

use chrono::Duration;
use chrono::NaiveDate;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::backtest::BacktestSimulator;
use crate::backtest::PerformanceAnalytics;
use crate::config::EngineConfig;
use crate::data::PriceHistoryProvider;
use crate::data::ReturnPanel;
use crate::data::ReturnSeriesBuilder;
use crate::deadline::Deadline;
use crate::error::EngineError;
use crate::error::Result;
use crate::optimize::random_portfolios;
use crate::optimize::FeasibleSet;
use crate::optimize::Optimizer;
use crate::risk::BlackLitterman;
use crate::risk::MarketMoments;
use crate::risk::RiskModel;
use crate::risk::View;
use crate::risk::ViewMatrix;
use crate::types::BacktestResult;
use crate::types::Constraints;
use crate::types::FrontierPoint;
use crate::types::Method;
use crate::types::Objective;
use crate::types::OptimizationResult;
use crate::types::Portfolio;
use crate::types::RebalancingFrequency;
use crate::types::WeightEntry;

fn default_true() -> bool {
  true
}

/// Inputs of [`Engine::optimize`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRequest {
  pub portfolio: Portfolio,
  #[serde(default)]
  pub objective: Objective,
  /// Target return (`return`) or target volatility (`risk`).
  #[serde(default)]
  pub target_value: Option<f64>,
  #[serde(default)]
  pub constraints: Constraints,
  #[serde(default)]
  pub method: Method,
  /// Ticker-addressed Black-Litterman views.
  #[serde(default)]
  pub views: Vec<View>,
  /// Raw pick-matrix views; takes precedence over `views`.
  #[serde(default)]
  pub view_matrix: Option<ViewMatrix>,
  /// Falls back to [`EngineConfig::risk_free_rate`].
  #[serde(default)]
  pub risk_free_rate: Option<f64>,
  /// Defaults to `end_date` minus the configured lookback.
  #[serde(default)]
  pub start_date: Option<NaiveDate>,
  /// Defaults to today.
  #[serde(default)]
  pub end_date: Option<NaiveDate>,
  /// Risk budget for `risk_parity`; equal when absent.
  #[serde(default)]
  pub risk_budget: Option<Vec<f64>>,
  #[serde(default = "default_true")]
  pub include_dividends: bool,
}

impl OptimizeRequest {
  /// Request with default objective, method and constraints.
  pub fn new(portfolio: Portfolio) -> Self {
    Self {
      portfolio,
      objective: Objective::default(),
      target_value: None,
      constraints: Constraints::default(),
      method: Method::default(),
      views: Vec::new(),
      view_matrix: None,
      risk_free_rate: None,
      start_date: None,
      end_date: None,
      risk_budget: None,
      include_dividends: true,
    }
  }
}

/// Inputs of [`Engine::backtest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestRequest {
  pub portfolio: Portfolio,
  pub start_date: NaiveDate,
  pub end_date: NaiveDate,
  pub initial_investment: f64,
  #[serde(default)]
  pub risk_free_rate: f64,
  #[serde(default)]
  pub benchmark_ticker: Option<String>,
  #[serde(default)]
  pub transaction_cost_rate: f64,
  #[serde(default = "default_true")]
  pub include_dividends: bool,
  #[serde(default)]
  pub rebalancing_frequency: RebalancingFrequency,
}

impl BacktestRequest {
  /// Zero-cost, quarterly rebalanced request without benchmark.
  pub fn new(portfolio: Portfolio, start_date: NaiveDate, end_date: NaiveDate, initial_investment: f64) -> Self {
    Self {
      portfolio,
      start_date,
      end_date,
      initial_investment,
      risk_free_rate: 0.0,
      benchmark_ticker: None,
      transaction_cost_rate: 0.0,
      include_dividends: true,
      rebalancing_frequency: RebalancingFrequency::default(),
    }
  }
}

/// Stateless portfolio engine.
#[derive(Clone, Debug, Default)]
pub struct Engine {
  config: EngineConfig,
}

impl Engine {
  pub fn new(config: EngineConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  fn risk_model(&self) -> RiskModel {
    RiskModel {
      periods_per_year: self.config.periods_per_year,
      condition_limit: self.config.condition_limit,
      ridge_scale: self.config.ridge_scale,
    }
  }

  fn window(&self, req: &OptimizeRequest) -> (NaiveDate, NaiveDate) {
    let end = req.end_date.unwrap_or_else(|| Utc::now().date_naive());
    let start = req
      .start_date
      .unwrap_or_else(|| end - Duration::days(self.config.lookback_days));
    (start, end)
  }

  fn panel(
    &self,
    provider: &dyn PriceHistoryProvider,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
    include_dividends: bool,
  ) -> Result<ReturnPanel> {
    let series = provider.get_series(tickers, start, end)?;
    ReturnSeriesBuilder::new(include_dividends, true, self.config.min_coverage).build(&series, start, end)
  }

  fn moments(&self, req: &OptimizeRequest, panel: &ReturnPanel, risk_free: f64) -> Result<MarketMoments> {
    let model = self.risk_model();
    if req.method != Method::BlackLitterman {
      return model.sample(panel);
    }

    let views = match &req.view_matrix {
      Some(vm) => vm.clone(),
      None => ViewMatrix::from_views(&req.views, panel.tickers())?,
    };
    let bl = BlackLitterman {
      tau: self.config.tau,
      risk_aversion: self.config.risk_aversion,
      fallback_risk_aversion: self.config.fallback_risk_aversion,
      risk_free,
    };
    model.black_litterman(panel, &bl, &req.portfolio.weights(), Some(&views))
  }

  /// Optimal weights, their statistics and the efficient frontier.
  pub fn optimize(&self, req: &OptimizeRequest, provider: &dyn PriceHistoryProvider) -> Result<OptimizationResult> {
    let deadline = Deadline::new(self.config.timeout);
    let tickers = req.portfolio.tickers();
    let set = FeasibleSet::new(&req.constraints, &req.portfolio.sectors())?;
    let risk_free = req.risk_free_rate.unwrap_or(self.config.risk_free_rate);

    let (start, end) = self.window(req);
    let panel = self.panel(provider, &tickers, start, end, req.include_dividends)?;
    let moments = self.moments(req, &panel, risk_free)?;

    let optimizer = Optimizer::from_config(&self.config);
    let mv = optimizer.mean_variance(&moments, &set, deadline);
    let result = match req.method {
      Method::RiskParity => optimizer.risk_parity(
        &moments,
        &set,
        req.risk_budget.as_deref(),
        risk_free,
        &deadline,
      )?,
      Method::Markowitz | Method::BlackLitterman => {
        optimizer.optimize(&mv, req.objective, req.target_value, risk_free)?
      }
    };
    let efficient_frontier = optimizer.frontier.sample(&mv)?;

    tracing::info!(
      method = ?req.method,
      objective = ?req.objective,
      assets = tickers.len(),
      periods = panel.n_periods(),
      expected_return = result.expected_return,
      volatility = result.volatility,
      sharpe = result.sharpe,
      frontier_points = efficient_frontier.len(),
      "optimization finished"
    );

    Ok(OptimizationResult {
      weights: tickers
        .into_iter()
        .zip(result.weights)
        .map(|(ticker, weight)| WeightEntry::new(ticker, weight))
        .collect(),
      expected_return: result.expected_return,
      volatility: result.volatility,
      sharpe_ratio: result.sharpe,
      efficient_frontier,
    })
  }

  /// Random long-only portfolios over the optimize window of `req`, seeded.
  pub fn scatter(
    &self,
    req: &OptimizeRequest,
    provider: &dyn PriceHistoryProvider,
    samples: usize,
    seed: u64,
  ) -> Result<Vec<FrontierPoint>> {
    let (start, end) = self.window(req);
    let panel = self.panel(provider, &req.portfolio.tickers(), start, end, req.include_dividends)?;
    let risk_free = req.risk_free_rate.unwrap_or(self.config.risk_free_rate);
    let moments = self.moments(req, &panel, risk_free)?;
    Ok(random_portfolios(&moments, samples, seed))
  }

  /// Replay the portfolio over `[start_date, end_date]`.
  pub fn backtest(&self, req: &BacktestRequest, provider: &dyn PriceHistoryProvider) -> Result<BacktestResult> {
    let deadline = Deadline::new(self.config.timeout);
    let tickers = req.portfolio.tickers();

    let mut fetch = tickers.clone();
    if let Some(bench) = &req.benchmark_ticker {
      if !fetch.contains(bench) {
        fetch.push(bench.clone());
      }
    }
    let all = self.panel(provider, &fetch, req.start_date, req.end_date, req.include_dividends)?;
    let panel = all.select(&tickers)?;
    let benchmark = match &req.benchmark_ticker {
      Some(b) => Some(
        all
          .series(b)
          .ok_or_else(|| EngineError::Data(format!("no returns for benchmark {b}")))?,
      ),
      None => None,
    };

    let sim = BacktestSimulator::new(
      req.initial_investment,
      req.transaction_cost_rate,
      req.rebalancing_frequency,
    )
    .run(&panel, &req.portfolio.weights(), &deadline)?;
    let metrics = PerformanceAnalytics::new(self.config.periods_per_year, req.risk_free_rate)
      .evaluate(&sim.nav, benchmark.as_deref())?;

    tracing::info!(
      assets = tickers.len(),
      periods = panel.n_periods(),
      frequency = %req.rebalancing_frequency,
      total_return = metrics.total_return,
      max_drawdown = metrics.max_drawdown,
      rebalances = sim.rebalance_count,
      "backtest finished"
    );

    Ok(BacktestResult {
      total_return: metrics.total_return,
      annualized_return: metrics.annualized_return,
      volatility: metrics.volatility,
      sharpe_ratio: metrics.sharpe_ratio,
      max_drawdown: metrics.max_drawdown,
      alpha: metrics.alpha,
      beta: metrics.beta,
      performance_data: sim.nav,
      sortino_ratio: metrics.sortino_ratio,
      calmar_ratio: metrics.calmar_ratio,
      value_at_risk_95: metrics.value_at_risk_95,
      mean_return: metrics.mean_return,
      rebalance_count: sim.rebalance_count,
      total_transaction_cost: sim.total_cost,
    })
  }
}
