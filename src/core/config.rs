use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::WalletError;

/// Which backend the vault's primary secret store uses. Selected by explicit
/// configuration at startup; the vault never probes the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretStoreBackend {
    Sqlite,
    File,
}

/// Vault storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default = "VaultConfig::default_backend")]
    pub backend: SecretStoreBackend,
    #[serde(default = "VaultConfig::default_database_url")]
    pub database_url: String,
    /// Directory for the encrypted fallback store, used only when the
    /// primary store is unavailable.
    #[serde(default = "VaultConfig::default_fallback_dir")]
    pub fallback_dir: PathBuf,
}

impl VaultConfig {
    fn default_backend() -> SecretStoreBackend {
        SecretStoreBackend::Sqlite
    }
    fn default_database_url() -> String {
        "sqlite://./data/vault.db?mode=rwc".to_string()
    }
    fn default_fallback_dir() -> PathBuf {
        PathBuf::from("./data/vault_fallback")
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            backend: Self::default_backend(),
            database_url: Self::default_database_url(),
            fallback_dir: Self::default_fallback_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinConfig {
    /// Esplora-style REST endpoint (address/utxo/tx routes).
    #[serde(default = "BitcoinConfig::default_esplora_url")]
    pub esplora_url: String,
    /// Flat fee in satoshi. Fee-rate estimation is deliberately out of
    /// scope; operators tune this per deployment.
    #[serde(default = "BitcoinConfig::default_flat_fee_sat")]
    pub flat_fee_sat: u64,
}

impl BitcoinConfig {
    fn default_esplora_url() -> String {
        "https://blockstream.info/api".to_string()
    }
    fn default_flat_fee_sat() -> u64 {
        1_000
    }
}

impl Default for BitcoinConfig {
    fn default() -> Self {
        Self {
            esplora_url: Self::default_esplora_url(),
            flat_fee_sat: Self::default_flat_fee_sat(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthereumConfig {
    #[serde(default = "EthereumConfig::default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "EthereumConfig::default_chain_id")]
    pub chain_id: u64,
    /// Optional etherscan-style endpoint for per-address history; plain
    /// JSON-RPC has no such method.
    #[serde(default)]
    pub explorer_url: Option<String>,
}

impl EthereumConfig {
    fn default_rpc_url() -> String {
        "https://eth.llamarpc.com".to_string()
    }
    fn default_chain_id() -> u64 {
        1
    }
}

impl Default for EthereumConfig {
    fn default() -> Self {
        Self {
            rpc_url: Self::default_rpc_url(),
            chain_id: Self::default_chain_id(),
            explorer_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorandConfig {
    #[serde(default = "AlgorandConfig::default_algod_url")]
    pub algod_url: String,
    /// Optional indexer endpoint for account history.
    #[serde(default)]
    pub indexer_url: Option<String>,
    /// Rounds a transaction stays valid after the suggested first round.
    #[serde(default = "AlgorandConfig::default_validity_window")]
    pub validity_window: u64,
}

impl AlgorandConfig {
    fn default_algod_url() -> String {
        "https://mainnet-api.algonode.cloud".to_string()
    }
    fn default_validity_window() -> u64 {
        1_000
    }
}

impl Default for AlgorandConfig {
    fn default() -> Self {
        Self {
            algod_url: Self::default_algod_url(),
            indexer_url: None,
            validity_window: Self::default_validity_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaConfig {
    #[serde(default = "SolanaConfig::default_rpc_url")]
    pub rpc_url: String,
    /// Polls when waiting for confirmation after submit.
    #[serde(default = "SolanaConfig::default_confirm_polls")]
    pub confirm_polls: u32,
}

impl SolanaConfig {
    fn default_rpc_url() -> String {
        "https://api.mainnet-beta.solana.com".to_string()
    }
    fn default_confirm_polls() -> u32 {
        10
    }
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self { rpc_url: Self::default_rpc_url(), confirm_polls: Self::default_confirm_polls() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworksConfig {
    #[serde(default)]
    pub bitcoin: BitcoinConfig,
    #[serde(default)]
    pub ethereum: EthereumConfig,
    #[serde(default)]
    pub algorand: AlgorandConfig,
    #[serde(default)]
    pub solana: SolanaConfig,
}

/// Top-level wallet configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub networks: NetworksConfig,
    /// Hard timeout for every provider call, in seconds. A stalled provider
    /// must never hang a user-facing action.
    #[serde(default = "WalletConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl WalletConfig {
    fn default_request_timeout_secs() -> u64 {
        8
    }

    /// Load from a TOML file. Missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| WalletError::Config(format!("cannot read config file: {e}")))?;
        toml::from_str(&raw).map_err(|e| WalletError::Config(format!("invalid config: {e}")))
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            vault: VaultConfig::default(),
            networks: NetworksConfig::default(),
            request_timeout_secs: Self::default_request_timeout_secs(),
        }
    }
}
