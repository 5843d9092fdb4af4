//! SQLite-backed identity store.
//!
//! One table mapping id → name plus the embedding serialized as a JSON
//! number array in a text column. No migrations beyond table creation.

use rusqlite::params;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tokio_rusqlite::Connection;
use vigil_core::IdentityRecord;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("embedding serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("stored embedding for id {id} is not a valid JSON array")]
    CorruptEmbedding { id: i64 },
}

/// Listing row — embeddings are deliberately excluded from enumeration.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
}

/// Handle to the registry database. Cheap to clone.
#[derive(Clone)]
pub struct IdentityStore {
    conn: Connection,
}

impl IdentityStore {
    /// Open (or create) the database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path.to_path_buf()).await?;
        Self::init(conn).await
    }

    /// Open a fresh in-memory database.
    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    embedding TEXT NOT NULL
                )",
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Insert a new identity; returns the assigned id.
    ///
    /// Names are not deduplicated — re-registering a name creates a second
    /// independent record.
    pub async fn register(&self, name: &str, embedding: &[f32]) -> Result<i64, StoreError> {
        let name = name.to_string();
        let blob = serde_json::to_string(embedding)?;
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (name, embedding) VALUES (?1, ?2)",
                    params![name, blob],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// All `{id, name}` pairs in insertion order.
    pub async fn list(&self) -> Result<Vec<UserSummary>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT id, name FROM users")?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(UserSummary { id: row.get(0)?, name: row.get(1)? })
                    })?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// All full records, embeddings included, in insertion order.
    pub async fn all(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        let raw = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT id, name, embedding FROM users")?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                    })?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        raw.into_iter()
            .map(|(id, name, blob)| {
                let embedding = serde_json::from_str(&blob)
                    .map_err(|_| StoreError::CorruptEmbedding { id })?;
                Ok(IdentityRecord { id, name, embedding })
            })
            .collect()
    }

    /// Delete one record; returns whether a row matched.
    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", params![id])?))
            .await?;
        Ok(changed > 0)
    }
}
