//! The adapter seam between wallet logic and individual networks.
//!
//! Every network implements [`ChainAdapter`]. Amounts cross this boundary
//! in the network's smallest base unit (satoshi, wei, microalgo, lamport)
//! as `u128`, which covers wei for any realistic balance.

use async_trait::async_trait;

use crate::core::domain::Network;
use crate::core::errors::WalletError;
use crate::crypto::mnemonic::Seed;

/// One historical transfer touching the wallet's address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInfo {
    pub txid: String,
    /// Base units; `None` when the data source does not expose the amount.
    pub amount: Option<u128>,
    /// Unix seconds; `None` for unconfirmed entries.
    pub timestamp: Option<u64>,
    pub confirmed: bool,
}

/// Lifecycle of an outgoing transfer. A transfer only moves forward through
/// these states; signing consumes the draft so a signed payload can never be
/// edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Draft,
    Signed,
    Submitted,
    Confirmed,
    Failed,
}

/// Per-send extras that only some networks use.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Transfer a token instead of the native asset, on networks with a
    /// token program.
    pub token: Option<TokenTransfer>,
    /// Free-form note attached on networks that carry one.
    pub note: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct TokenTransfer {
    /// Token identifier in the network's native form.
    pub mint: String,
    pub decimals: u8,
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn network(&self) -> Network;

    /// Confirmed spendable balance in base units.
    async fn get_balance(&self, address: &str) -> Result<u128, WalletError>;

    /// Most recent transfers, newest first. Networks without an indexer
    /// configured return an empty list rather than an error.
    async fn get_recent_transactions(
        &self,
        address: &str,
    ) -> Result<Vec<TransactionInfo>, WalletError>;

    /// Build, sign and broadcast a transfer of `amount` base units to `to`.
    /// Returns the network transaction id. Local failures (bad address,
    /// insufficient funds) must never reach the broadcast endpoint.
    async fn send(
        &self,
        seed: &Seed,
        to: &str,
        amount: u128,
        options: &SendOptions,
    ) -> Result<String, WalletError>;
}
