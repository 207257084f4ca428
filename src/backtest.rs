//! # Backtest
//!
//! $$
//! V_0=\text{initial},\qquad V_t=V_{t-1}\big(1+h_{t-1}^\top r_t\big)-\text{cost}_t
//! $$
//!
//! Historical replay of an allocation and its performance statistics.

pub mod analytics;
pub mod simulator;

pub use analytics::max_drawdown;
pub use analytics::quantile;
pub use analytics::PerformanceAnalytics;
pub use analytics::PerformanceMetrics;
pub use simulator::BacktestSimulator;
pub use simulator::Simulation;
