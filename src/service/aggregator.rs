//! Concurrent balance aggregation across every configured network.
//!
//! One slow or dead RPC endpoint must not sink the whole portfolio view:
//! each network's fetch runs under its own timeout, and a failure shows up
//! as a zero balance with the error recorded on that row.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{instrument, warn};

use crate::blockchain::{AdapterRegistry, ChainAdapter};
use crate::core::domain::{Network, WalletRecord};
use crate::core::errors::WalletError;

#[derive(Debug, Clone, Serialize)]
pub struct NetworkBalance {
    pub network: Network,
    pub symbol: &'static str,
    /// Base units. Zero when the fetch failed; see `error`.
    pub balance: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioView {
    pub balances: Vec<NetworkBalance>,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
}

impl PortfolioView {
    pub fn balance_of(&self, network: Network) -> Option<&NetworkBalance> {
        self.balances.iter().find(|b| b.network == network)
    }
}

pub struct BalanceAggregator {
    registry: Arc<AdapterRegistry>,
    per_network_timeout: Duration,
}

impl BalanceAggregator {
    pub fn new(registry: Arc<AdapterRegistry>, per_network_timeout: Duration) -> Self {
        Self { registry, per_network_timeout }
    }

    /// Fetch every network's balance concurrently. Always returns one row
    /// per account in the wallet, in network order.
    #[instrument(skip(self, wallet))]
    pub async fn portfolio(&self, wallet: &WalletRecord) -> Result<PortfolioView, WalletError> {
        let mut fetches = Vec::new();
        for (network, adapter) in self.registry.iter() {
            let Some(address) = wallet.address_for(network) else {
                continue;
            };
            fetches.push(self.fetch_one(network, adapter.clone(), address.to_string()));
        }

        let balances = join_all(fetches).await;
        Ok(PortfolioView { balances, fetched_at: chrono::Utc::now() })
    }

    async fn fetch_one(
        &self,
        network: Network,
        adapter: Arc<dyn ChainAdapter>,
        address: String,
    ) -> NetworkBalance {
        let result = tokio::time::timeout(self.per_network_timeout, adapter.get_balance(&address))
            .await
            .unwrap_or_else(|_| {
                Err(WalletError::NetworkUnavailable(format!(
                    "{network}: balance fetch timed out"
                )))
            });

        match result {
            Ok(balance) => NetworkBalance {
                network,
                symbol: network.symbol(),
                balance,
                error: None,
            },
            Err(e) => {
                warn!(network = %network, error = %e, "balance fetch failed");
                NetworkBalance {
                    network,
                    symbol: network.symbol(),
                    balance: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::traits::{SendOptions, TransactionInfo};
    use crate::crypto::mnemonic::Seed;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct FakeAdapter {
        network: Network,
        outcome: Result<u128, &'static str>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl ChainAdapter for FakeAdapter {
        fn network(&self) -> Network {
            self.network
        }

        async fn get_balance(&self, _address: &str) -> Result<u128, WalletError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.outcome
                .map_err(|msg| WalletError::NetworkUnavailable(msg.to_string()))
        }

        async fn get_recent_transactions(
            &self,
            _address: &str,
        ) -> Result<Vec<TransactionInfo>, WalletError> {
            Ok(Vec::new())
        }

        async fn send(
            &self,
            _seed: &Seed,
            _to: &str,
            _amount: u128,
            _options: &SendOptions,
        ) -> Result<String, WalletError> {
            unreachable!("aggregator never sends")
        }
    }

    fn wallet_with(networks: &[Network]) -> WalletRecord {
        let accounts: BTreeMap<_, _> = networks
            .iter()
            .map(|&network| {
                (
                    network,
                    crate::core::domain::PerNetworkAccount {
                        network,
                        derivation_path: "m/0'".to_string(),
                        public_key_hex: String::new(),
                        address: format!("{network}-addr"),
                    },
                )
            })
            .collect();
        WalletRecord::new(accounts)
    }

    fn aggregator(adapters: Vec<Arc<dyn ChainAdapter>>, timeout: Duration) -> BalanceAggregator {
        BalanceAggregator::new(Arc::new(AdapterRegistry::from_adapters(adapters)), timeout)
    }

    #[tokio::test]
    async fn all_networks_healthy() {
        let agg = aggregator(
            vec![
                Arc::new(FakeAdapter {
                    network: Network::Bitcoin,
                    outcome: Ok(50_000),
                    delay: None,
                }),
                Arc::new(FakeAdapter {
                    network: Network::Ethereum,
                    outcome: Ok(1_000_000_000_000_000_000),
                    delay: None,
                }),
            ],
            Duration::from_secs(1),
        );
        let view = agg
            .portfolio(&wallet_with(&[Network::Bitcoin, Network::Ethereum]))
            .await
            .unwrap();
        assert_eq!(view.balances.len(), 2);
        assert_eq!(view.balance_of(Network::Bitcoin).unwrap().balance, 50_000);
        assert!(view.balance_of(Network::Bitcoin).unwrap().error.is_none());
    }

    #[tokio::test]
    async fn one_failing_network_does_not_sink_the_rest() {
        let agg = aggregator(
            vec![
                Arc::new(FakeAdapter {
                    network: Network::Bitcoin,
                    outcome: Ok(50_000),
                    delay: None,
                }),
                Arc::new(FakeAdapter {
                    network: Network::Solana,
                    outcome: Err("rpc down"),
                    delay: None,
                }),
            ],
            Duration::from_secs(1),
        );
        let view = agg
            .portfolio(&wallet_with(&[Network::Bitcoin, Network::Solana]))
            .await
            .unwrap();

        let sol = view.balance_of(Network::Solana).unwrap();
        assert_eq!(sol.balance, 0);
        assert!(sol.error.as_ref().unwrap().contains("rpc down"));
        assert_eq!(view.balance_of(Network::Bitcoin).unwrap().balance, 50_000);
    }

    #[tokio::test]
    async fn slow_network_times_out_instead_of_blocking() {
        let agg = aggregator(
            vec![Arc::new(FakeAdapter {
                network: Network::Algorand,
                outcome: Ok(9),
                delay: Some(Duration::from_secs(30)),
            })],
            Duration::from_millis(50),
        );
        let view = agg.portfolio(&wallet_with(&[Network::Algorand])).await.unwrap();
        let algo = view.balance_of(Network::Algorand).unwrap();
        assert_eq!(algo.balance, 0);
        assert!(algo.error.as_ref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn networks_missing_from_wallet_are_skipped() {
        let agg = aggregator(
            vec![
                Arc::new(FakeAdapter {
                    network: Network::Bitcoin,
                    outcome: Ok(1),
                    delay: None,
                }),
                Arc::new(FakeAdapter {
                    network: Network::Ethereum,
                    outcome: Ok(2),
                    delay: None,
                }),
            ],
            Duration::from_secs(1),
        );
        let view = agg.portfolio(&wallet_with(&[Network::Bitcoin])).await.unwrap();
        assert_eq!(view.balances.len(), 1);
    }
}
