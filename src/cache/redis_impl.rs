//! Redis cache store.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use super::{CacheError, CacheResult, CacheStore};

/// Maps Redis errors to CacheError.
fn map_redis_error(err: redis::RedisError) -> CacheError {
    if err.is_connection_refusal() || err.is_timeout() || err.is_connection_dropped() {
        CacheError::Unavailable(err.to_string())
    } else {
        CacheError::Operation(err.to_string())
    }
}

/// Redis backend using a connection manager for reconnects.
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
}

impl RedisCache {
    /// Connects to `url` (e.g. `redis://localhost:6379/0`).
    pub async fn new(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(map_redis_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(map_redis_error)
    }

    async fn delete(&self, key: &str) -> CacheResult<u64> {
        let mut conn = self.conn.clone();
        conn.del(key).await.map_err(map_redis_error)
    }
}
