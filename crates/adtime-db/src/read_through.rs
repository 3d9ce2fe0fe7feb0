//! Read-through caching helpers.
//!
//! Two shapes are provided:
//!
//! - [`validated`] re-checks every cached value before returning it. A
//!   value that fails the check is treated as a miss, as is a value that
//!   does not deserialize or a cache that cannot be reached. Freshly
//!   loaded values are checked too; an invalid one is returned as an
//!   error and never cached.
//! - [`trusting`] returns any value that deserializes.
//!
//! In both, the cache is an optimization: a cache failure is logged and
//! the value is loaded from the store instead. Failing to write the
//! loaded value back is also only logged.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::CacheClient;
use crate::error::DbError;

/// Return the cached value at `key` if it passes `validate`, otherwise
/// `load` it, validate it, and cache it for `ttl`.
///
/// # Errors
///
/// Returns whatever `load` returns on failure, or the error produced by
/// `validate` for a freshly loaded value.
pub async fn validated<T, V, F, Fut>(
    cache: &CacheClient,
    key: &str,
    ttl: Duration,
    validate: V,
    load: F,
) -> Result<T, DbError>
where
    T: Serialize + DeserializeOwned + Sync,
    V: Fn(&T) -> Result<(), DbError>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    if let Some(cached) = lookup::<T>(cache, key).await {
        match validate(&cached) {
            Ok(()) => {
                tracing::debug!(key, "Cache hit");
                return Ok(cached);
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "Discarding invalid cached value");
            }
        }
    }

    let value = load().await?;
    validate(&value)?;
    store(cache, key, &value, ttl).await;
    Ok(value)
}

/// Return the cached value at `key` if it deserializes, otherwise `load`
/// it and cache it for `ttl`.
///
/// # Errors
///
/// Returns whatever `load` returns on failure.
pub async fn trusting<T, F, Fut>(
    cache: &CacheClient,
    key: &str,
    ttl: Duration,
    load: F,
) -> Result<T, DbError>
where
    T: Serialize + DeserializeOwned + Sync,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    if let Some(cached) = lookup::<T>(cache, key).await {
        tracing::debug!(key, "Cache hit");
        return Ok(cached);
    }

    let value = load().await?;
    store(cache, key, &value, ttl).await;
    Ok(value)
}

/// Read `key`, turning every kind of failure into a miss.
async fn lookup<T: DeserializeOwned>(cache: &CacheClient, key: &str) -> Option<T> {
    match cache.get_json::<T>(key).await {
        Ok(value) => Some(value),
        Err(DbError::KeyNotFound(_)) => {
            tracing::debug!(key, "Cache miss");
            None
        }
        Err(DbError::Serialization(err)) => {
            tracing::warn!(key, error = %err, "Discarding undecodable cached value");
            None
        }
        Err(err) => {
            tracing::warn!(key, error = %err, "Cache read failed, falling back to store");
            None
        }
    }
}

async fn store<T: Serialize + Sync>(cache: &CacheClient, key: &str, value: &T, ttl: Duration) {
    if let Err(err) = cache.set_json(key, value, ttl).await {
        tracing::warn!(key, error = %err, "Failed to cache value");
    }
}
