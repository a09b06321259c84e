//! Encrypted vault on top of a [`SecretStore`].
//!
//! Blob layout is `nonce(12) || ciphertext`, AES-256-GCM, one fresh random
//! nonce per write. The vault key is either a random per-session key or
//! derived from a user PIN with Argon2id over a stored random salt.
//!
//! Failure policy: a blob that does not authenticate is treated as absent,
//! deleted, and logged; the caller sees `None`, never stale plaintext. The
//! fallback store is consulted only when the primary store returns an error,
//! not when it returns a miss.

use std::collections::HashMap;
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::core::errors::WalletError;
use crate::security::secret_store::SecretStore;

const NONCE_LEN: usize = 12;
const SALT_ENTRY: &str = "vault.salt";
const PIN_ENTRY: &str = "vault.pin";

/// The AES-256 vault key. Zeroizes on drop.
pub struct SessionKey {
    key: Zeroizing<[u8; 32]>,
}

impl SessionKey {
    /// Random key, valid for this process only. Used when no PIN is set.
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *key);
        Self { key }
    }

    /// Argon2id over a stored random salt.
    pub fn from_pin(pin: &str, salt: &[u8]) -> Result<Self, WalletError> {
        let mut key = Zeroizing::new([0u8; 32]);
        Argon2::default()
            .hash_password_into(pin.as_bytes(), salt, &mut *key)
            .map_err(|e| WalletError::Crypto(format!("pin key derivation: {e}")))?;
        Ok(Self { key })
    }

    #[cfg(test)]
    pub fn from_raw(key: [u8; 32]) -> Self {
        Self { key: Zeroizing::new(key) }
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}

pub struct SecureVault {
    primary: Arc<dyn SecretStore>,
    fallback: Option<Arc<dyn SecretStore>>,
    // one async lock per entry name, so concurrent writers serialize
    // without blocking unrelated entries
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SecureVault {
    pub fn new(primary: Arc<dyn SecretStore>, fallback: Option<Arc<dyn SecretStore>>) -> Self {
        Self { primary, fallback, locks: Mutex::new(HashMap::new()) }
    }

    fn lock_for(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Encrypt and persist `plaintext` under `name`, overwriting any
    /// previous value.
    pub async fn store(
        &self,
        name: &str,
        plaintext: &[u8],
        session: &SessionKey,
    ) -> Result<(), WalletError> {
        let blob = encrypt(&session.key, plaintext)?;
        let guard = self.lock_for(name);
        let _held = guard.lock().await;

        match self.primary.put(name, &blob).await {
            Ok(()) => Ok(()),
            Err(primary_err) => match &self.fallback {
                Some(fallback) => {
                    warn!(entry = %name, error = %primary_err, "primary store failed, using fallback");
                    fallback.put(name, &blob).await
                }
                None => Err(primary_err),
            },
        }
    }

    /// Decrypt the entry under `name`. Missing and unreadable entries both
    /// come back as `None`; unreadable ones are removed.
    pub async fn load(
        &self,
        name: &str,
        session: &SessionKey,
    ) -> Result<Option<Zeroizing<Vec<u8>>>, WalletError> {
        let guard = self.lock_for(name);
        let _held = guard.lock().await;

        let blob = match self.primary.get(name).await {
            Ok(blob) => blob,
            Err(primary_err) => match &self.fallback {
                Some(fallback) => {
                    warn!(entry = %name, error = %primary_err, "primary store failed, reading fallback");
                    fallback.get(name).await?
                }
                None => return Err(primary_err),
            },
        };
        let Some(blob) = blob else { return Ok(None) };

        match decrypt(&session.key, &blob) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(e) => {
                warn!(entry = %name, error = %e, "vault entry failed authentication, removing");
                self.primary.delete(name).await?;
                if let Some(fallback) = &self.fallback {
                    let _ = fallback.delete(name).await;
                }
                Ok(None)
            }
        }
    }

    pub async fn delete(&self, name: &str) -> Result<(), WalletError> {
        let guard = self.lock_for(name);
        let _held = guard.lock().await;
        self.primary.delete(name).await?;
        if let Some(fallback) = &self.fallback {
            fallback.delete(name).await?;
        }
        Ok(())
    }

    /// Destroy every entry in every store.
    pub async fn wipe(&self) -> Result<(), WalletError> {
        self.primary.delete_all().await?;
        if let Some(fallback) = &self.fallback {
            fallback.delete_all().await?;
        }
        self.locks.lock().clear();
        Ok(())
    }

    /// The random salt used for PIN key derivation, created on first use.
    pub async fn pin_salt(&self) -> Result<Vec<u8>, WalletError> {
        if let Some(salt) = self.primary.get(SALT_ENTRY).await? {
            return Ok(salt);
        }
        let mut salt = vec![0u8; 16];
        OsRng.fill_bytes(&mut salt);
        self.primary.put(SALT_ENTRY, &salt).await?;
        debug!("created vault pin salt");
        Ok(salt)
    }

    /// Record a PHC-format Argon2id hash of the PIN for later verification.
    pub async fn store_pin(&self, pin: &str) -> Result<(), WalletError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(pin.as_bytes(), &salt)
            .map_err(|e| WalletError::Crypto(format!("pin hash: {e}")))?;
        self.primary.put(PIN_ENTRY, hash.to_string().as_bytes()).await
    }

    /// False when no PIN is recorded or the candidate does not match.
    pub async fn verify_pin(&self, pin: &str) -> Result<bool, WalletError> {
        let Some(stored) = self.primary.get(PIN_ENTRY).await? else {
            return Ok(false);
        };
        let stored = String::from_utf8(stored)
            .map_err(|e| WalletError::Storage(format!("pin entry corrupt: {e}")))?;
        let parsed = PasswordHash::new(&stored)
            .map_err(|e| WalletError::Storage(format!("pin entry corrupt: {e}")))?;
        Ok(Argon2::default().verify_password(pin.as_bytes(), &parsed).is_ok())
    }
}

fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, WalletError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| WalletError::Crypto("encryption failed".to_string()))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

fn decrypt(key: &[u8; 32], blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, WalletError> {
    if blob.len() < NONCE_LEN {
        return Err(WalletError::DecryptionFailed("blob shorter than nonce".to_string()));
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| WalletError::DecryptionFailed("authentication failed".to_string()))?;
    Ok(Zeroizing::new(plaintext))
}
