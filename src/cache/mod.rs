// src/cache/mod.rs

//! Cache store seam and the degrade-to-miss facade.
//!
//! Backends implement [`CacheStore`] over string values. Callers go through
//! [`Cache`], which serializes values and turns every backend failure into a
//! miss, so an unavailable cache never fails an operation.

pub mod file;
pub mod keys;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_impl;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::{CacheBackend, CacheConfig};

pub use file::FileCache;
pub use keys::{ATTENDANCE_PREFIX, CONTENT_PREFIX, SCHEDULE_PREFIX, cache_key};
pub use memory::MemoryCache;
#[cfg(feature = "redis")]
pub use redis_impl::RedisCache;

/// Backend failure. Never leaves the [`Cache`] facade.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),

    #[error("Cache operation failed: {0}")]
    Operation(String),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Key/value store with per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Overwrite the whole value under `key`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Returns the number of entries removed.
    async fn delete(&self, key: &str) -> CacheResult<u64>;
}

/// Store that holds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCache;

#[async_trait]
impl CacheStore for DisabledCache {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> CacheResult<u64> {
        Ok(0)
    }
}

/// Serializing facade over a [`CacheStore`].
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledCache))
    }

    /// Build the configured backend.
    ///
    /// A redis backend that cannot be reached at startup degrades to a
    /// disabled cache. A file backend is swept of expired entries first.
    pub async fn from_config(config: &CacheConfig) -> Self {
        match config.backend {
            CacheBackend::Memory => Self::new(Arc::new(MemoryCache::new(config.max_entries))),
            CacheBackend::File => {
                let store = FileCache::new(&config.dir);
                if let Err(e) = store.purge_expired().await {
                    log::warn!("Startup cache sweep failed: {e}");
                }
                Self::new(Arc::new(store))
            }
            CacheBackend::Disabled => Self::disabled(),
            CacheBackend::Redis => Self::connect_redis(&config.redis_url).await,
        }
    }

    #[cfg(feature = "redis")]
    async fn connect_redis(url: &str) -> Self {
        match RedisCache::new(url).await {
            Ok(store) => {
                log::info!("Connected to redis cache at {url}");
                Self::new(Arc::new(store))
            }
            Err(e) => {
                log::warn!("Redis cache unavailable ({e}); caching disabled");
                Self::disabled()
            }
        }
    }

    #[cfg(not(feature = "redis"))]
    async fn connect_redis(_url: &str) -> Self {
        log::warn!("Built without the `redis` feature; caching disabled");
        Self::disabled()
    }

    /// Read and deserialize a value. Failures and shape mismatches are misses.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Cached value for '{key}' has unexpected shape: {e}");
                None
            }
        }
    }

    /// Serialize and store a value. Returns whether the write went through.
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        match serde_json::to_string(value) {
            Ok(raw) => self.set_raw(key, &raw, ttl).await,
            Err(e) => {
                log::warn!("Could not serialize value for '{key}': {e}");
                false
            }
        }
    }

    /// Read a binary payload stored as base64 text.
    pub async fn get_binary(&self, key: &str) -> Option<Vec<u8>> {
        let raw = self.get_raw(key).await?;
        match BASE64.decode(raw.as_bytes()) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::warn!("Cached binary value for '{key}' is not base64: {e}");
                None
            }
        }
    }

    pub async fn set_binary(&self, key: &str, bytes: &[u8], ttl: Duration) -> bool {
        self.set_raw(key, &BASE64.encode(bytes), ttl).await
    }

    /// Remove an entry, returning how many were deleted (0 on failure).
    pub async fn delete(&self, key: &str) -> u64 {
        match self.store.delete(key).await {
            Ok(count) => count,
            Err(e) => {
                log::warn!("Cache delete failed for '{key}': {e}");
                0
            }
        }
    }

    async fn get_raw(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(Some(raw)) => {
                log::debug!("Cache hit: {key}");
                Some(raw)
            }
            Ok(None) => {
                log::debug!("Cache miss: {key}");
                None
            }
            Err(e) => {
                log::warn!("Cache read failed for '{key}', treating as miss: {e}");
                None
            }
        }
    }

    async fn set_raw(&self, key: &str, raw: &str, ttl: Duration) -> bool {
        match self.store.set(key, raw, ttl).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Cache write failed for '{key}': {e}");
                false
            }
        }
    }
}
