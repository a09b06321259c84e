//! Core domain types, configuration, errors and the wallet facade.

pub mod config;
pub mod domain;
pub mod errors;
pub mod wallet_manager;

pub use config::WalletConfig;
pub use domain::{Network, PerNetworkAccount, WalletRecord};
pub use errors::WalletError;
pub use wallet_manager::WalletManager;
