//! # Data
//!
//! $$
//! r_{t}^{(i)}=\frac{P_t^{(i)}}{P_{t-1}^{(i)}}-1,\qquad t\in\bigcap_i \mathcal T_i
//! $$
//!
//! Price-history access and aligned return construction.

pub mod provider;
pub mod returns;

pub use provider::InMemoryPriceHistory;
pub use provider::PriceHistoryProvider;
pub use returns::ReturnPanel;
pub use returns::ReturnSeriesBuilder;
