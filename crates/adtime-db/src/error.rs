//! Error types for the storage layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] and [`fred`] errors with additional context about which
//! operation failed. Callers branch on the kind (see
//! [`DbError::is_not_found`]), never on the message text.

use std::time::Duration;

use rust_decimal::Decimal;

/// The kind of entity a point lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// A row in `orders`.
    Order,
    /// A row in `textures`.
    Texture,
}

impl core::fmt::Display for Entity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Order => f.write_str("order"),
            Self::Texture => f.write_str("texture"),
        }
    }
}

/// Errors that can occur in the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A key was not found in the cache.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A point lookup found no row.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// What was looked up.
        entity: Entity,
        /// The identifier that was looked up.
        id: String,
    },

    /// The store holds a texture whose price is not strictly positive.
    #[error("invalid price for texture {texture_id}: {price}")]
    InvalidPrice {
        /// The offending texture.
        texture_id: String,
        /// The stored price.
        price: Decimal,
    },

    /// The store holds status text that is not a known order status.
    #[error("invalid order status in store: {0}")]
    InvalidStatus(#[from] adtime_types::ParseStatusError),

    /// A storage operation failed; `source` holds the cause.
    #[error("failed to {operation} ({target}): {source}")]
    Operation {
        /// What the caller asked for, e.g. `save order`.
        operation: &'static str,
        /// The entity identifier the operation was about.
        target: String,
        /// The underlying failure.
        source: Box<DbError>,
    },

    /// An operation did not finish before its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that was abandoned.
        operation: &'static str,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// Connection establishment gave up after exhausting its retry budget.
    #[error("failed to connect after {attempts} attempts in {elapsed:?}: {source}")]
    ConnectExhausted {
        /// How many connection attempts were made.
        attempts: u32,
        /// Time spent before giving up.
        elapsed: Duration,
        /// The last connection failure.
        source: Box<DbError>,
    },

    /// A substitute (in-process) backend reported a failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl DbError {
    /// Whether this error (or the error it wraps) is a missing-row lookup.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Operation { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Whether this error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Operation { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// Wrap this error with the operation and entity it occurred in.
    ///
    /// Not-found and timeout errors already name what they are about and
    /// are returned unchanged.
    #[must_use]
    pub fn context(self, operation: &'static str, target: impl core::fmt::Display) -> Self {
        match self {
            Self::NotFound { .. } | Self::Timeout { .. } => self,
            other => Self::Operation {
                operation,
                target: target.to_string(),
                source: Box::new(other),
            },
        }
    }
}
