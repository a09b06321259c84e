//! Cross-network services built on top of the adapters.

pub mod aggregator;

pub use aggregator::{BalanceAggregator, NetworkBalance, PortfolioView};
