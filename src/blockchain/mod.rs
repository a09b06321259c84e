//! Network adapters and the registry that wires them up from config.

pub mod algorand;
pub mod bitcoin;
pub mod ethereum;
pub mod solana;
pub mod traits;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::config::WalletConfig;
use crate::core::domain::Network;
use crate::core::errors::WalletError;

pub use traits::{ChainAdapter, SendOptions, TokenTransfer, TransactionInfo, TransferStatus};

/// All configured adapters, keyed by network. Built once at startup and
/// shared; adapters hold no per-request state.
pub struct AdapterRegistry {
    adapters: BTreeMap<Network, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn from_config(config: &WalletConfig) -> Result<Self, WalletError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| WalletError::Config(format!("http client: {e}")))?;

        let mut adapters: BTreeMap<Network, Arc<dyn ChainAdapter>> = BTreeMap::new();
        adapters.insert(
            Network::Bitcoin,
            Arc::new(bitcoin::BitcoinAdapter::new(config.networks.bitcoin.clone(), client.clone())),
        );
        adapters.insert(
            Network::Ethereum,
            Arc::new(ethereum::EthereumAdapter::new(
                config.networks.ethereum.clone(),
                client.clone(),
            )?),
        );
        adapters.insert(
            Network::Algorand,
            Arc::new(algorand::AlgorandAdapter::new(
                config.networks.algorand.clone(),
                client.clone(),
            )),
        );
        adapters.insert(
            Network::Solana,
            Arc::new(solana::SolanaAdapter::new(config.networks.solana.clone(), client)),
        );
        Ok(Self { adapters })
    }

    /// Registry over arbitrary adapters. Lets tests substitute fakes.
    pub fn from_adapters(adapters: Vec<Arc<dyn ChainAdapter>>) -> Self {
        Self {
            adapters: adapters.into_iter().map(|a| (a.network(), a)).collect(),
        }
    }

    pub fn get(&self, network: Network) -> Result<&Arc<dyn ChainAdapter>, WalletError> {
        self.adapters
            .get(&network)
            .ok_or_else(|| WalletError::UnsupportedNetwork(network.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Network, &Arc<dyn ChainAdapter>)> {
        self.adapters.iter().map(|(n, a)| (*n, a))
    }
}
