//! Durable credential storage.
//!
//! Two named entries, `credential` and `profile`, both present or both
//! absent. Implementations must write and clear them together.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use riskdesk_auth::{Credential, UserProfile};

use crate::error::StoreError;

pub const CREDENTIAL_KEY: &str = "credential";
pub const PROFILE_KEY: &str = "profile";

/// Credential and profile as persisted together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub credential: Credential,
    pub profile: UserProfile,
}

impl StoredSession {
    fn encode(&self) -> Result<(String, String), StoreError> {
        let credential = serde_json::to_string(&self.credential).map_err(|e| {
            StoreError::Serialization {
                key: CREDENTIAL_KEY,
                message: e.to_string(),
            }
        })?;
        let profile = serde_json::to_string(&self.profile).map_err(|e| StoreError::Serialization {
            key: PROFILE_KEY,
            message: e.to_string(),
        })?;
        Ok((credential, profile))
    }

    fn decode(credential: Option<String>, profile: Option<String>) -> Result<Option<Self>, StoreError> {
        match (credential, profile) {
            (None, None) => Ok(None),
            (Some(_), None) => Err(StoreError::Inconsistent("credential without profile")),
            (None, Some(_)) => Err(StoreError::Inconsistent("profile without credential")),
            (Some(c), Some(p)) => {
                let credential = serde_json::from_str(&c).map_err(|e| StoreError::Serialization {
                    key: CREDENTIAL_KEY,
                    message: e.to_string(),
                })?;
                let profile = serde_json::from_str(&p).map_err(|e| StoreError::Serialization {
                    key: PROFILE_KEY,
                    message: e.to_string(),
                })?;
                Ok(Some(Self { credential, profile }))
            }
        }
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<StoredSession>, StoreError>;

    /// Replace both entries.
    async fn save(&self, session: &StoredSession) -> Result<(), StoreError>;

    /// Remove both entries.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Process-local store; contents do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<&'static str, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw entry access, for inspecting the layout.
    pub fn entry(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    /// Write a single raw entry (bypasses the both-or-neither rule).
    pub fn put_raw(&self, key: &'static str, value: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, value.into());
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("memory store lock poisoned".to_string())
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        StoredSession::decode(
            entries.get(CREDENTIAL_KEY).cloned(),
            entries.get(PROFILE_KEY).cloned(),
        )
    }

    async fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        let (credential, profile) = session.encode()?;
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        entries.insert(CREDENTIAL_KEY, credential);
        entries.insert(PROFILE_KEY, profile);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        entries.remove(CREDENTIAL_KEY);
        entries.remove(PROFILE_KEY);
        Ok(())
    }
}

/// SQLite-backed store (`session_entries` key/value table).
///
/// A single pooled connection serialises writers; saves and clears run in one
/// transaction so the two entries never diverge on disk.
#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    /// Open (or create) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Backend(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect_with(options).await
    }

    /// Private in-memory database, for tests and ephemeral shells.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect_with(options).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_entries (
                key         TEXT PRIMARY KEY,
                value       TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    async fn entry(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM session_entries WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        let credential = self.entry(CREDENTIAL_KEY).await?;
        let profile = self.entry(PROFILE_KEY).await?;
        StoredSession::decode(credential, profile)
    }

    async fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        let (credential, profile) = session.encode()?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        for (key, value) in [(CREDENTIAL_KEY, credential), (PROFILE_KEY, profile)] {
            sqlx::query(
                r#"
                INSERT INTO session_entries (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM session_entries WHERE key IN (?1, ?2)")
            .bind(CREDENTIAL_KEY)
            .bind(PROFILE_KEY)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
