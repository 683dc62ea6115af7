//! Key-value record store over SQLite.

use std::path::Path;

use facecheck_core::{CheckInEvent, Identity};
use rusqlite::{params, OptionalExtension};
use thiserror::Error;
use tokio_rusqlite::Connection;

/// Record key for the serialized roster.
const USERS_KEY: &str = "facecheck-users";
/// Record key for the serialized attendance log.
const LOG_KEY: &str = "facecheck-log";

const SCHEMA_SQL: &str =
    "CREATE TABLE IF NOT EXISTS records (key TEXT PRIMARY KEY, value TEXT NOT NULL)";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Handle to the on-disk state database.
///
/// Writes go through a single background connection; the engine is the
/// only caller, so there is no cross-record consistency to coordinate.
pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    /// Open (or create) the database at `path` and ensure the schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).await?;
        let store = Self { conn };
        store.init().await?;
        tracing::info!(path = %path.display(), "state store opened");
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute(SCHEMA_SQL, [])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn get(&self, key: &'static str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .call(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM records WHERE key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;
        Ok(value)
    }

    async fn put(&self, key: &'static str, value: String) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO records (key, value) VALUES (?1, ?2) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, value],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Load the roster record. An absent or corrupt record loads as empty.
    pub async fn load_roster(&self) -> Result<Vec<Identity>, StoreError> {
        Ok(self.load_record(USERS_KEY).await?)
    }

    /// Load the attendance log record. An absent or corrupt record loads
    /// as empty. Day filtering is the caller's concern.
    pub async fn load_log(&self) -> Result<Vec<CheckInEvent>, StoreError> {
        Ok(self.load_record(LOG_KEY).await?)
    }

    async fn load_record<T: serde::de::DeserializeOwned>(
        &self,
        key: &'static str,
    ) -> Result<Vec<T>, StoreError> {
        let Some(raw) = self.get(key).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(parsed) => Ok(parsed),
            Err(error) => {
                tracing::warn!(key, %error, "discarding corrupt record, starting empty");
                Ok(Vec::new())
            }
        }
    }

    pub async fn save_roster(&self, roster: &[Identity]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(roster)?;
        self.put(USERS_KEY, raw).await
    }

    pub async fn save_log(&self, events: &[CheckInEvent]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(events)?;
        self.put(LOG_KEY, raw).await
    }
}
