//! Pluggable at-rest storage for vault blobs.
//!
//! A [`SecretStore`] holds opaque byte blobs keyed by name. It never sees
//! plaintext: encryption happens in the vault layer above, so a compromised
//! store yields only AES-GCM ciphertext. The backend is picked by explicit
//! configuration, never probed from the environment.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::core::errors::WalletError;

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn put(&self, name: &str, blob: &[u8]) -> Result<(), WalletError>;
    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, WalletError>;
    async fn delete(&self, name: &str) -> Result<(), WalletError>;
    /// Remove every entry. Used by wallet wipe.
    async fn delete_all(&self) -> Result<(), WalletError>;
}

/// SQLite-backed store. One row per named blob, upsert on write.
pub struct SqliteSecretStore {
    pool: SqlitePool,
}

impl SqliteSecretStore {
    pub async fn connect(database_url: &str) -> Result<Self, WalletError> {
        if let Some(path) = file_path_of(database_url) {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| WalletError::Storage(format!("sqlite connect: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vault_entries (
                name       TEXT PRIMARY KEY,
                blob       BLOB NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        info!(url = %database_url, "secret store ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl SecretStore for SqliteSecretStore {
    async fn put(&self, name: &str, blob: &[u8]) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            INSERT INTO vault_entries (name, blob, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET blob = excluded.blob,
                                            updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(blob)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        debug!(entry = %name, "stored vault entry");
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, WalletError> {
        let row = sqlx::query("SELECT blob FROM vault_entries WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>(0)))
    }

    async fn delete(&self, name: &str) -> Result<(), WalletError> {
        sqlx::query("DELETE FROM vault_entries WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), WalletError> {
        sqlx::query("DELETE FROM vault_entries").execute(&self.pool).await?;
        info!("secret store wiped");
        Ok(())
    }
}

/// Flat-file store, one file per entry. Serves as the fallback when the
/// primary backend is unavailable, and as the `file` backend on hosts
/// without SQLite.
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, WalletError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    // hex keeps entry names filesystem-safe regardless of caller input
    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", hex::encode(name.as_bytes())))
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn put(&self, name: &str, blob: &[u8]) -> Result<(), WalletError> {
        let path = self.path_for(name);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(entry = %name, "stored vault entry (file)");
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, WalletError> {
        match tokio::fs::read(self.path_for(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str) -> Result<(), WalletError> {
        match tokio::fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_all(&self) -> Result<(), WalletError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().map(|e| e == "bin").unwrap_or(false) {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
        info!("file store wiped");
        Ok(())
    }
}

fn file_path_of(database_url: &str) -> Option<PathBuf> {
    let rest = database_url.strip_prefix("sqlite://")?;
    let rest = rest.split('?').next().unwrap_or(rest);
    if rest == ":memory:" {
        None
    } else {
        Some(PathBuf::from(rest))
    }
}
