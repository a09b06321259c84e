//! The wallet facade: one object that owns the vault, the derived account
//! set and the network adapters.
//!
//! The seed phrase lives encrypted in the vault and is decrypted only for
//! the duration of a signing call. The vault key is a random per-process
//! session key until a PIN is set; [`unlock_with_pin`](WalletManager::unlock_with_pin)
//! switches to the PIN-derived key so the vault survives restarts.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, instrument};

use crate::blockchain::{AdapterRegistry, SendOptions};
use crate::core::config::{SecretStoreBackend, WalletConfig};
use crate::core::domain::{Network, WalletRecord};
use crate::core::errors::WalletError;
use crate::crypto::address::AddressValidator;
use crate::crypto::derivation::KeyDerivationEngine;
use crate::crypto::mnemonic::{Seed, SeedManager};
use crate::security::secret_store::{FileSecretStore, SqliteSecretStore};
use crate::security::vault::{SecureVault, SessionKey};
use crate::service::aggregator::{BalanceAggregator, PortfolioView};

const SEED_ENTRY: &str = "wallet.seed";
const RECORD_ENTRY: &str = "wallet.record";

pub struct WalletManager {
    vault: SecureVault,
    registry: Arc<AdapterRegistry>,
    aggregator: BalanceAggregator,
    session: RwLock<Arc<SessionKey>>,
    record: RwLock<Option<WalletRecord>>,
}

impl WalletManager {
    /// Build stores, adapters and a fresh session key from configuration.
    pub async fn new(config: WalletConfig) -> Result<Self, WalletError> {
        let vault = match config.vault.backend {
            SecretStoreBackend::Sqlite => {
                let primary = SqliteSecretStore::connect(&config.vault.database_url).await?;
                let fallback = FileSecretStore::open(&config.vault.fallback_dir).await?;
                SecureVault::new(Arc::new(primary), Some(Arc::new(fallback)))
            }
            SecretStoreBackend::File => {
                let primary = FileSecretStore::open(&config.vault.fallback_dir).await?;
                SecureVault::new(Arc::new(primary), None)
            }
        };

        let registry = Arc::new(AdapterRegistry::from_config(&config)?);
        let aggregator = BalanceAggregator::new(registry.clone(), config.request_timeout());

        Ok(Self {
            vault,
            registry,
            aggregator,
            session: RwLock::new(Arc::new(SessionKey::generate())),
            record: RwLock::new(None),
        })
    }

    fn session(&self) -> Arc<SessionKey> {
        self.session.read().clone()
    }

    /// Replace the session key with one derived from the PIN, then reload
    /// whatever the vault holds under that key.
    pub async fn unlock_with_pin(&self, pin: &str) -> Result<bool, WalletError> {
        if !self.vault.verify_pin(pin).await? {
            return Ok(false);
        }
        let salt = self.vault.pin_salt().await?;
        *self.session.write() = Arc::new(SessionKey::from_pin(pin, &salt)?);
        self.reload_record().await?;
        Ok(true)
    }

    /// Record a PIN and re-encrypt the current wallet under the PIN-derived
    /// key so it outlives this process.
    pub async fn store_pin(&self, pin: &str) -> Result<(), WalletError> {
        let seed = self.load_seed().await?;
        let record = self.record.read().clone();

        self.vault.store_pin(pin).await?;
        let salt = self.vault.pin_salt().await?;
        let session = Arc::new(SessionKey::from_pin(pin, &salt)?);
        *self.session.write() = session.clone();

        if let Some(seed) = seed {
            self.vault.store(SEED_ENTRY, seed.phrase().as_bytes(), &*session).await?;
        }
        if let Some(record) = record {
            self.persist_record(&record).await?;
        }
        Ok(())
    }

    pub async fn verify_pin(&self, pin: &str) -> Result<bool, WalletError> {
        self.vault.verify_pin(pin).await
    }

    /// Create a brand new wallet. The returned seed phrase must be shown
    /// to the user exactly once for backup.
    #[instrument(skip(self))]
    pub async fn generate_wallet(&self) -> Result<(WalletRecord, Seed), WalletError> {
        let seed = SeedManager::generate()?;
        let record = self.install_seed(&seed).await?;
        info!("generated new wallet");
        Ok((record, seed))
    }

    /// Rebuild the wallet from an existing phrase. Same phrase, same
    /// addresses, on any device.
    #[instrument(skip(self, phrase))]
    pub async fn recover_wallet(&self, phrase: &str) -> Result<WalletRecord, WalletError> {
        let seed = SeedManager::import(phrase)?;
        let record = self.install_seed(&seed).await?;
        info!("recovered wallet from seed phrase");
        Ok(record)
    }

    async fn install_seed(&self, seed: &Seed) -> Result<WalletRecord, WalletError> {
        let accounts = KeyDerivationEngine::derive_all(seed)?;
        let record = WalletRecord::new(accounts);

        let session = self.session();
        self.vault.store(SEED_ENTRY, seed.phrase().as_bytes(), &*session).await?;
        self.persist_record(&record).await?;

        *self.record.write() = Some(record.clone());
        Ok(record)
    }

    async fn persist_record(&self, record: &WalletRecord) -> Result<(), WalletError> {
        let json = serde_json::to_vec(record)?;
        self.vault.store(RECORD_ENTRY, &json, &*self.session()).await
    }

    async fn reload_record(&self) -> Result<(), WalletError> {
        let loaded = match self.vault.load(RECORD_ENTRY, &*self.session()).await? {
            Some(bytes) => Some(serde_json::from_slice(&bytes)?),
            None => None,
        };
        *self.record.write() = loaded;
        Ok(())
    }

    /// The decrypted seed, if one is installed and readable under the
    /// current session key.
    pub async fn load_seed(&self) -> Result<Option<Seed>, WalletError> {
        let Some(bytes) = self.vault.load(SEED_ENTRY, &*self.session()).await? else {
            return Ok(None);
        };
        let phrase = std::str::from_utf8(&bytes)
            .map_err(|e| WalletError::Storage(format!("seed entry corrupt: {e}")))?;
        Ok(Some(SeedManager::import(phrase)?))
    }

    /// The wallet's receive address on `network`.
    pub fn get_primary_address(&self, network: Network) -> Result<String, WalletError> {
        let record = self.record.read();
        let record = record
            .as_ref()
            .ok_or_else(|| WalletError::Storage("no wallet installed".to_string()))?;
        record
            .address_for(network)
            .map(str::to_string)
            .ok_or_else(|| WalletError::UnsupportedNetwork(network.to_string()))
    }

    pub fn wallet(&self) -> Option<WalletRecord> {
        self.record.read().clone()
    }

    pub fn validate_address(&self, network: Network, address: &str) -> bool {
        AddressValidator::is_valid(network, address)
    }

    /// Sign and broadcast a transfer. Address syntax is checked before any
    /// network traffic, and the seed is decrypted only for this call.
    #[instrument(skip(self, options), fields(network = %network))]
    pub async fn send_transaction(
        &self,
        network: Network,
        to: &str,
        amount: u128,
        options: &SendOptions,
    ) -> Result<String, WalletError> {
        AddressValidator::require_valid(network, to)?;
        let seed = self
            .load_seed()
            .await?
            .ok_or_else(|| WalletError::Storage("no wallet installed".to_string()))?;
        let adapter = self.registry.get(network)?;
        adapter.send(&seed, to.trim(), amount, options).await
    }

    pub async fn get_balance(&self, network: Network) -> Result<u128, WalletError> {
        let address = self.get_primary_address(network)?;
        self.registry.get(network)?.get_balance(&address).await
    }

    pub async fn get_recent_transactions(
        &self,
        network: Network,
    ) -> Result<Vec<crate::blockchain::TransactionInfo>, WalletError> {
        let address = self.get_primary_address(network)?;
        self.registry.get(network)?.get_recent_transactions(&address).await
    }

    /// Every network's balance in one concurrent sweep.
    pub async fn portfolio(&self) -> Result<PortfolioView, WalletError> {
        let record = self
            .wallet()
            .ok_or_else(|| WalletError::Storage("no wallet installed".to_string()))?;
        self.aggregator.portfolio(&record).await
    }

    /// Destroy all persisted secrets and forget the in-memory wallet.
    #[instrument(skip(self))]
    pub async fn wipe_wallet(&self) -> Result<(), WalletError> {
        self.vault.wipe().await?;
        *self.record.write() = None;
        *self.session.write() = Arc::new(SessionKey::generate());
        info!("wallet wiped");
        Ok(())
    }
}
