//! `Dragonfly` (Redis-compatible) cache operations.
//!
//! The cache never holds authoritative data: every value can be rebuilt
//! from `PostgreSQL`, and every key carries a TTL except where noted.
//!
//! # Key Patterns
//!
//! | Pattern | Type | TTL | Description |
//! |---------|------|-----|-------------|
//! | `texture:{id}` | JSON | 24h | Validated texture catalog entry |
//! | `order_stats` | JSON | 1h | Aggregated order statistics |
//! | `ratelimit:{user_id}:{action}` | Integer | window | Fixed-window counter |

use std::time::Duration;

use fred::prelude::*;
use fred::types::ExpireOptions;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DbError;

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
///
/// Wraps a [`fred::prelude::Client`]; cloning is cheap and shares the
/// connection.
#[derive(Clone)]
pub struct DragonflyPool {
    client: Client,
}

impl DragonflyPool {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://[:password@]host:port[/db]`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        Self::connect_with_password(url, None).await
    }

    /// Connect to `Dragonfly` at `url`, authenticating with `password`.
    ///
    /// The password is handed to the client as-is rather than embedded in
    /// the URL, so it may contain `@`, `:`, `/` or any other character.
    /// A password given here replaces one present in the URL.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect_with_password(
        url: &str,
        password: Option<&str>,
    ) -> Result<Self, DbError> {
        let config = client_config(url, password)?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    // =========================================================================
    // JSON values
    // =========================================================================

    /// Serialize `value` as JSON and store it at `key`, expiring after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if serialization fails.
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), DbError> {
        let json = serde_json::to_string(value)?;
        let expiry = Expiration::EX(ttl_secs(ttl));
        let _: () = self
            .client
            .set(key, json.as_str(), Some(expiry), None, false)
            .await?;
        Ok(())
    }

    /// Read the value at `key` and deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::KeyNotFound`] if the key does not exist.
    /// Returns [`DbError::Serialization`] if deserialization fails.
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T, DbError> {
        let value: Option<String> = self.client.get(key).await?;
        value.map_or_else(
            || Err(DbError::KeyNotFound(key.to_owned())),
            |s| Ok(serde_json::from_str(&s)?),
        )
    }

    /// Delete a key.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn delete(&self, key: &str) -> Result<(), DbError> {
        let _: u32 = self.client.del(key).await?;
        Ok(())
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Atomically increment the integer at `key` and return the new value.
    ///
    /// A missing key counts from zero and is created without an expiry.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the increment fails.
    pub async fn incr(&self, key: &str) -> Result<i64, DbError> {
        let count: i64 = self.client.incr(key).await?;
        Ok(count)
    }

    /// Set `key` to expire after `ttl` (rounded up to whole seconds) unless
    /// it already has an expiry (`EXPIRE key ttl NX`).
    ///
    /// Returns `false` if the key does not exist or already expires.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the command fails.
    pub async fn expire_if_unset(&self, key: &str, ttl: Duration) -> Result<bool, DbError> {
        let applied: bool = self
            .client
            .expire(key, ttl_secs(ttl), Some(ExpireOptions::NX))
            .await?;
        Ok(applied)
    }

    /// Flush all keys from the `Dragonfly` instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), DbError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the QUIT command fails.
    pub async fn quit(&self) -> Result<(), DbError> {
        self.client.quit().await?;
        tracing::info!("Dragonfly connection closed");
        Ok(())
    }
}

/// Parse `url` into a client config, overriding its password if given.
fn client_config(url: &str, password: Option<&str>) -> Result<Config, DbError> {
    let mut config = Config::from_url(url)
        .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;
    if let Some(password) = password {
        config.password = Some(password.to_owned());
    }
    Ok(config)
}

/// Whole seconds for an `EX`/`EXPIRE` argument, never below one.
fn ttl_secs(ttl: Duration) -> i64 {
    let mut secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs = secs.saturating_add(1);
    }
    i64::try_from(secs.max(1)).unwrap_or(i64::MAX)
}
