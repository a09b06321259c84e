use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::core::errors::WalletError;

/// The four supported networks. The public surface speaks in these symbols;
/// everything transaction-model-specific lives behind the chain adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Bitcoin,
    Ethereum,
    Algorand,
    Solana,
}

impl Network {
    pub const ALL: [Network; 4] =
        [Network::Bitcoin, Network::Ethereum, Network::Algorand, Network::Solana];

    /// Ticker symbol of the native asset.
    pub fn symbol(&self) -> &'static str {
        match self {
            Network::Bitcoin => "BTC",
            Network::Ethereum => "ETH",
            Network::Algorand => "ALGO",
            Network::Solana => "SOL",
        }
    }

    /// Name of the network's smallest indivisible denomination. All internal
    /// amount math happens in these units.
    pub fn base_unit(&self) -> &'static str {
        match self {
            Network::Bitcoin => "satoshi",
            Network::Ethereum => "wei",
            Network::Algorand => "microalgo",
            Network::Solana => "lamport",
        }
    }
}

impl FromStr for Network {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bitcoin" | "btc" => Ok(Network::Bitcoin),
            "ethereum" | "eth" => Ok(Network::Ethereum),
            "algorand" | "algo" => Ok(Network::Algorand),
            "solana" | "sol" => Ok(Network::Solana),
            other => Err(WalletError::UnsupportedNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Bitcoin => "bitcoin",
            Network::Ethereum => "ethereum",
            Network::Algorand => "algorand",
            Network::Solana => "solana",
        };
        write!(f, "{name}")
    }
}

/// One derived account: the public half only. Addresses are pure functions of
/// seed + path, so re-deriving from the same seed always reproduces these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerNetworkAccount {
    pub network: Network,
    /// HD path, or a label for non-hierarchical schemes.
    pub derivation_path: String,
    pub public_key_hex: String,
    pub address: String,
}

/// Result of wallet creation/recovery handed back to the collaborator UI.
/// Never contains key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub accounts: BTreeMap<Network, PerNetworkAccount>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl WalletRecord {
    pub fn new(accounts: BTreeMap<Network, PerNetworkAccount>) -> Self {
        Self { accounts, created_at: chrono::Utc::now() }
    }

    pub fn address_for(&self, network: Network) -> Option<&str> {
        self.accounts.get(&network).map(|a| a.address.as_str())
    }
}

/// 32-byte private key with scoped access. The secret is zeroized on drop and
/// never printed by `Debug`.
pub struct PrivateKey(Secret<[u8; 32]>);

impl PrivateKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(Secret::new(bytes))
    }

    pub fn try_from_slice(slice: &[u8]) -> Result<Self, WalletError> {
        if slice.len() != 32 {
            return Err(WalletError::Crypto("private key must be 32 bytes".to_string()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(slice);
        let key = PrivateKey::new(arr);
        arr.zeroize();
        Ok(key)
    }

    /// Scoped access to the raw bytes. Callers get a borrow for the duration
    /// of the closure only, which keeps key material from leaking into
    /// longer-lived state.
    pub fn with_secret<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8; 32]) -> R,
    {
        f(self.0.expose_secret())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrivateKey").field(&"[REDACTED]").finish()
    }
}

impl Zeroize for PrivateKey {
    fn zeroize(&mut self) {
        self.0 = Secret::new([0u8; 32]);
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}
