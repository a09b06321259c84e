//! Self-custodial multi-chain wallet core.
//!
//! One BIP-39 seed phrase drives accounts on Bitcoin, Ethereum, Algorand
//! and Solana. The crate covers the full custody loop: phrase generation
//! and recovery, encrypted at-rest storage, per-network key derivation and
//! address formats, transfer construction and signing, and a concurrent
//! balance aggregator. It is a library, not a service: embed it behind
//! whatever surface (CLI, daemon, RPC) the host application provides.
//!
//! ```no_run
//! use multichain_wallet_core::{Network, WalletConfig, WalletManager};
//!
//! # async fn demo() -> Result<(), multichain_wallet_core::WalletError> {
//! let manager = WalletManager::new(WalletConfig::default()).await?;
//! let (wallet, seed) = manager.generate_wallet().await?;
//! println!("back this up: {}", seed.phrase());
//! println!("btc receive address: {}", wallet.address_for(Network::Bitcoin).unwrap());
//! # Ok(())
//! # }
//! ```

pub mod blockchain;
pub mod core;
pub mod crypto;
pub mod security;
pub mod service;

pub use crate::blockchain::{
    AdapterRegistry, ChainAdapter, SendOptions, TokenTransfer, TransactionInfo,
};
pub use crate::core::{
    Network, PerNetworkAccount, WalletConfig, WalletError, WalletManager, WalletRecord,
};
pub use crate::crypto::{AddressValidator, KeyDerivationEngine, Seed, SeedManager, WordCount};
pub use crate::security::{SecretStore, SecureVault, SessionKey};
pub use crate::service::{BalanceAggregator, NetworkBalance, PortfolioView};
