//! Cache client used by the storage layer.
//!
//! [`CacheClient`] dispatches to `Dragonfly` or to the in-process
//! [`MemoryCache`]. Key builders and TTLs for every cached value live here
//! so readers and invalidators agree on them.

use std::time::Duration;

use adtime_types::{RateLimitAction, TextureId, UserId};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::dragonfly::DragonflyPool;
use crate::error::DbError;
use crate::memory::MemoryCache;

/// Lifetime of a cached texture.
pub const TEXTURE_TTL: Duration = Duration::from_secs(86_400);

/// Key of the cached statistics snapshot.
pub const ORDER_STATS_KEY: &str = "order_stats";

/// Lifetime of the cached statistics snapshot.
pub const ORDER_STATS_TTL: Duration = Duration::from_secs(3600);

/// Cache key of a texture.
pub fn texture_key(id: &TextureId) -> String {
    format!("texture:{id}")
}

/// Cache key of a rate-limit counter.
pub fn rate_limit_key(user_id: UserId, action: RateLimitAction) -> String {
    format!("ratelimit:{user_id}:{}", action.as_str())
}

/// Handle to a Redis-compatible cache. Cloning shares the connection.
#[derive(Clone)]
pub enum CacheClient {
    /// A live `Dragonfly`/Redis server.
    Dragonfly(DragonflyPool),
    /// An in-process map.
    Memory(MemoryCache),
}

impl CacheClient {
    /// Store `value` as JSON at `key` for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] or the backend error.
    pub async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), DbError> {
        match self {
            Self::Dragonfly(df) => df.set_json(key, value, ttl).await,
            Self::Memory(mem) => mem.set_json(key, value, ttl).await,
        }
    }

    /// Read and deserialize the JSON value at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::KeyNotFound`] on a miss, [`DbError::Serialization`]
    /// if the value does not deserialize, or the backend error.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T, DbError> {
        match self {
            Self::Dragonfly(df) => df.get_json(key).await,
            Self::Memory(mem) => mem.get_json(key).await,
        }
    }

    /// Delete `key`. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn delete(&self, key: &str) -> Result<(), DbError> {
        match self {
            Self::Dragonfly(df) => df.delete(key).await,
            Self::Memory(mem) => mem.delete(key).await,
        }
    }

    /// Atomically increment the counter at `key` and return the new value.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn incr(&self, key: &str) -> Result<i64, DbError> {
        match self {
            Self::Dragonfly(df) => df.incr(key).await,
            Self::Memory(mem) => mem.incr(key).await,
        }
    }

    /// Set `key` to expire after `ttl` unless it already has an expiry.
    /// Returns `false` if it does not exist or already expires.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn expire_if_unset(&self, key: &str, ttl: Duration) -> Result<bool, DbError> {
        match self {
            Self::Dragonfly(df) => df.expire_if_unset(key, ttl).await,
            Self::Memory(mem) => mem.expire_if_unset(key, ttl).await,
        }
    }

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the QUIT command fails.
    pub async fn close(&self) -> Result<(), DbError> {
        match self {
            Self::Dragonfly(df) => df.quit().await,
            Self::Memory(_) => Ok(()),
        }
    }
}

impl From<DragonflyPool> for CacheClient {
    fn from(pool: DragonflyPool) -> Self {
        Self::Dragonfly(pool)
    }
}

impl From<MemoryCache> for CacheClient {
    fn from(cache: MemoryCache) -> Self {
        Self::Memory(cache)
    }
}
