//! Total lookups over a [`CacheBackend`]

use super::backend::CacheBackend;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Decoded cache document; empty when the entity is unknown
pub type Entity = Map<String, Value>;

#[derive(Clone)]
pub struct CacheLookup {
    backend: Arc<dyn CacheBackend>,
}

impl CacheLookup {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        log::info!("🗂️  Cache lookup using {} backend", backend.backend_type());
        Self { backend }
    }

    /// Decoded JSON object stored under `key`, or an empty entity
    pub async fn get(&self, key: &str) -> Entity {
        match self.backend.get_raw(key).await {
            Ok(raw) => decode_entity(key, raw.as_deref()),
            Err(e) => {
                log::warn!("⚠️  Cache read failed for {}: {}", key, e);
                Entity::new()
            }
        }
    }

    /// Positional multi-key lookup, same per-key semantics as [`Self::get`].
    ///
    /// Always returns exactly `keys.len()` entities.
    pub async fn multi_get(&self, keys: &[String]) -> Vec<Entity> {
        if keys.is_empty() {
            return Vec::new();
        }

        match self.backend.mget_raw(keys).await {
            Ok(values) if values.len() == keys.len() => keys
                .iter()
                .zip(values)
                .map(|(key, raw)| decode_entity(key, raw.as_deref()))
                .collect(),
            Ok(values) => {
                log::warn!(
                    "⚠️  Cache returned {} values for {} keys, treating all as missing",
                    values.len(),
                    keys.len()
                );
                vec![Entity::new(); keys.len()]
            }
            Err(e) => {
                log::warn!("⚠️  Cache multi-read failed for {} keys: {}", keys.len(), e);
                vec![Entity::new(); keys.len()]
            }
        }
    }
}

fn decode_entity(key: &str, raw: Option<&str>) -> Entity {
    let Some(raw) = raw else {
        log::debug!("Cache miss: {}", key);
        return Entity::new();
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            log::debug!("Cache value for {} is not a JSON object", key);
            Entity::new()
        }
        Err(e) => {
            log::debug!("Cache value for {} is not valid JSON: {}", key, e);
            Entity::new()
        }
    }
}
