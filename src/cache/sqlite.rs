//! SQLite cache backend over the `cache_entries` table
//!
//! The table is filled by an external loader; the pipeline only reads it.
//! [`SqliteCache::load_seed_file`] exists for local runs without that loader.

use super::backend::{CacheBackend, CacheError};
use crate::db::SharedConnection;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;

pub struct SqliteCache {
    conn: SharedConnection,
}

impl SqliteCache {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Upsert every entry of a JSON object file (`{"<entity id>": {...}, ...}`).
    ///
    /// Returns the number of entries written.
    pub fn load_seed_file(&self, path: impl AsRef<Path>) -> Result<usize, CacheError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let seed: serde_json::Map<String, Value> = serde_json::from_str(&text)?;

        let mut conn = self.conn.lock().map_err(|_| CacheError::LockPoisoned)?;
        let tx = conn.transaction()?;
        for (key, entity) in &seed {
            tx.execute(
                "INSERT INTO cache_entries (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, entity.to_string()],
            )?;
        }
        tx.commit()?;

        log::info!(
            "🗂️  Loaded {} cache entries from {}",
            seed.len(),
            path.as_ref().display()
        );
        Ok(seed.len())
    }

    fn read(conn: &Connection, key: &str) -> Result<Option<String>, CacheError> {
        let value = conn
            .query_row(
                "SELECT value FROM cache_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

#[async_trait]
impl CacheBackend for SqliteCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::LockPoisoned)?;
        Self::read(&conn, key)
    }

    async fn mget_raw(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        let conn = self.conn.lock().map_err(|_| CacheError::LockPoisoned)?;
        keys.iter().map(|key| Self::read(&conn, key)).collect()
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}
