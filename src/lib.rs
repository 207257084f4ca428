//! # folio-engine
//!
//! $$
//! \mathbf{w}^\*=\arg\min_{\mathbf{w}\in\mathcal W}\mathbf{w}^\top\Sigma\mathbf{w},\qquad
//! V_t=V_{t-1}\big(1+\mathbf{h}_{t-1}^\top\mathbf{r}_t\big)
//! $$
//!
//! Portfolio optimization (mean-variance, Black-Litterman, risk parity),
//! efficient-frontier sampling and rebalanced historical backtests over
//! caller-supplied price histories.
//!
//! ```ignore
//! let provider = InMemoryPriceHistory::from_json_str(&prices)?;
//! let engine = Engine::default();
//! let result = engine.optimize(&OptimizeRequest::new(portfolio), &provider)?;
//! ```

pub mod backtest;
pub mod config;
pub mod data;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod optimize;
pub mod risk;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use config::QpSettings;
pub use data::InMemoryPriceHistory;
pub use data::PriceHistoryProvider;
pub use engine::BacktestRequest;
pub use engine::Engine;
pub use engine::OptimizeRequest;
pub use error::EngineError;
pub use error::Result;
pub use types::BacktestResult;
pub use types::Constraints;
pub use types::Holding;
pub use types::Method;
pub use types::Objective;
pub use types::OptimizationResult;
pub use types::Portfolio;
pub use types::PricePoint;
pub use types::PriceSeries;
pub use types::RebalancingFrequency;
