//! Cache backend trait and error type

use async_trait::async_trait;

#[derive(Debug)]
pub enum CacheError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Database(String),
    LockPoisoned,
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err)
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Database(err.to_string())
    }
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Io(e) => write!(f, "IO error: {}", e),
            CacheError::Serialization(e) => write!(f, "Serialization error: {}", e),
            CacheError::Database(e) => write!(f, "Database error: {}", e),
            CacheError::LockPoisoned => write!(f, "Cache lock poisoned"),
        }
    }
}

impl std::error::Error for CacheError {}

/// Raw key-value access to the cache store.
///
/// Values are the stored JSON text, undecoded. Decoding and the empty-entity
/// fallback are the job of [`super::CacheLookup`].
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Positional multi-key read, same length as `keys`
    async fn mget_raw(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get_raw(key).await?);
        }
        Ok(values)
    }

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
