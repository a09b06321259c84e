//! At-rest protection: encrypted vault and its storage backends.

pub mod secret_store;
pub mod vault;

pub use secret_store::{FileSecretStore, SecretStore, SqliteSecretStore};
pub use vault::{SecureVault, SessionKey};
