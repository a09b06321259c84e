//! Ethereum adapter over a JSON-RPC provider.
//!
//! Transfers are EIP-1559 with the nonce read fresh from the pending block
//! at send time, so a long-lived wallet process never reuses a stale nonce.
//! History is optional and comes from an etherscan-compatible explorer when
//! one is configured.

use std::str::FromStr;

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, MiddlewareError, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address as EthAddress, BlockNumber, Eip1559TransactionRequest, U256};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::blockchain::traits::{ChainAdapter, SendOptions, TransactionInfo};
use crate::core::config::EthereumConfig;
use crate::core::domain::Network;
use crate::core::errors::WalletError;
use crate::crypto::derivation::KeyDerivationEngine;
use crate::crypto::mnemonic::Seed;

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    result: Vec<ExplorerTx>,
}

#[derive(Debug, Deserialize)]
struct ExplorerTx {
    hash: String,
    value: String,
    #[serde(rename = "timeStamp")]
    time_stamp: String,
    confirmations: String,
}

pub struct EthereumAdapter {
    config: EthereumConfig,
    provider: Provider<Http>,
    client: reqwest::Client,
}

impl EthereumAdapter {
    pub fn new(config: EthereumConfig, client: reqwest::Client) -> Result<Self, WalletError> {
        let url = reqwest::Url::parse(&config.rpc_url)
            .map_err(|e| WalletError::Config(format!("ethereum rpc url: {e}")))?;
        let provider = Provider::new(Http::new_with_client(url, client.clone()));
        Ok(Self { config, provider, client })
    }

    fn parse_address(address: &str) -> Result<EthAddress, WalletError> {
        EthAddress::from_str(address)
            .map_err(|e| WalletError::InvalidAddress(format!("ethereum: {e}")))
    }
}

fn provider_err(context: &str, err: impl std::fmt::Display) -> WalletError {
    WalletError::NetworkUnavailable(format!("{context}: {err}"))
}

fn u256_to_u128(value: U256) -> u128 {
    if value > U256::from(u128::MAX) {
        u128::MAX
    } else {
        value.as_u128()
    }
}

#[async_trait]
impl ChainAdapter for EthereumAdapter {
    fn network(&self) -> Network {
        Network::Ethereum
    }

    async fn get_balance(&self, address: &str) -> Result<u128, WalletError> {
        let address = Self::parse_address(address)?;
        let balance = self
            .provider
            .get_balance(address, None)
            .await
            .map_err(|e| provider_err("eth_getBalance", e))?;
        Ok(u256_to_u128(balance))
    }

    async fn get_recent_transactions(
        &self,
        address: &str,
    ) -> Result<Vec<TransactionInfo>, WalletError> {
        let Some(explorer) = &self.config.explorer_url else {
            return Ok(Vec::new());
        };
        let url = format!(
            "{}/api?module=account&action=txlist&address={address}&sort=desc",
            explorer.trim_end_matches('/')
        );
        let response: ExplorerResponse = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WalletError::from_http("explorer txlist", e))?
            .error_for_status()
            .map_err(|e| WalletError::from_http("explorer txlist", e))?
            .json()
            .await
            .map_err(|e| WalletError::from_http("explorer txlist decode", e))?;

        Ok(response
            .result
            .into_iter()
            .map(|tx| TransactionInfo {
                txid: tx.hash,
                amount: tx.value.parse::<u128>().ok(),
                timestamp: tx.time_stamp.parse::<u64>().ok(),
                confirmed: tx.confirmations.parse::<u64>().map(|c| c > 0).unwrap_or(false),
            })
            .collect())
    }

    #[instrument(skip(self, seed, _options), fields(network = "ethereum"))]
    async fn send(
        &self,
        seed: &Seed,
        to: &str,
        amount: u128,
        _options: &SendOptions,
    ) -> Result<String, WalletError> {
        let to = Self::parse_address(to)?;

        let key = KeyDerivationEngine::derive_private_key(seed, Network::Ethereum)?;
        let wallet = key.with_secret(|bytes| {
            LocalWallet::from_bytes(bytes)
                .map_err(|e| WalletError::Crypto(format!("ethereum key: {e}")))
        })?;
        let wallet = wallet.with_chain_id(self.config.chain_id);
        let from = wallet.address();

        let balance = self
            .provider
            .get_balance(from, None)
            .await
            .map_err(|e| provider_err("eth_getBalance", e))?;
        if balance < U256::from(amount) {
            return Err(WalletError::InsufficientFunds(format!(
                "need {amount} wei, have {balance} wei"
            )));
        }

        // read the nonce fresh every time, including pending txs
        let nonce = self
            .provider
            .get_transaction_count(from, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| provider_err("eth_getTransactionCount", e))?;

        let tx = Eip1559TransactionRequest::new()
            .from(from)
            .to(to)
            .value(U256::from(amount))
            .nonce(nonce)
            .chain_id(self.config.chain_id);

        let signer = SignerMiddleware::new(self.provider.clone(), wallet);
        // a JSON-RPC error body means the node saw and rejected the tx;
        // anything else means it may never have arrived
        let pending = signer.send_transaction(tx, None).await.map_err(|e| {
            if e.as_error_response().is_some() {
                WalletError::BroadcastFailed(format!("ethereum send: {e}"))
            } else {
                provider_err("eth_sendRawTransaction", e)
            }
        })?;
        let txid = format!("{:#x}", pending.tx_hash());
        info!(txid = %txid, amount_wei = amount, "ethereum transfer broadcast");
        Ok(txid)
    }
}
