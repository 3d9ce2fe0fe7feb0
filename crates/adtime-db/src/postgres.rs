//! `PostgreSQL` connection establishment and pool configuration.
//!
//! `PostgreSQL` is the source of truth for orders, the texture catalog and
//! user consent. The pool is built once at startup by
//! [`PostgresPool::connect_with_retry`] and handed to the
//! [`Repository`](crate::repository::Repository).
//!
//! Uses [`sqlx`] with runtime query construction (not compile-time checked)
//! to avoid requiring a live database at build time. All queries are
//! parameterized to prevent SQL injection.

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgPool};

use crate::error::DbError;
use crate::retry::{self, RetryPolicy};

/// Default maximum number of open connections.
const DEFAULT_MAX_OPEN_CONNS: u32 = 25;

/// Default number of connections kept after idle reaping.
const DEFAULT_MAX_IDLE_CONNS: u32 = 5;

/// Default maximum lifetime of a single connection in seconds.
const DEFAULT_CONN_MAX_LIFETIME_SECS: u64 = 1800;

/// Default idle time before a connection is closed, in seconds.
const DEFAULT_CONN_MAX_IDLE_TIME_SECS: u64 = 300;

/// Default connection timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Configuration for the `PostgreSQL` connection pool.
#[derive(Clone)]
pub struct PostgresConfig {
    /// Database host name.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Login role.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Database name.
    pub database: String,
    /// Maximum number of open connections.
    pub max_open_conns: u32,
    /// Connections retained once idle ones have been reaped.
    pub max_idle_conns: u32,
    /// Maximum lifetime of a single connection.
    pub conn_max_lifetime: Duration,
    /// Idle time after which a connection is closed.
    pub conn_max_idle_time: Duration,
    /// Timeout for opening or acquiring a connection.
    pub connect_timeout: Duration,
    /// Backoff used while the database is unreachable at startup.
    pub retry: RetryPolicy,
}

impl core::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("max_open_conns", &self.max_open_conns)
            .field("max_idle_conns", &self.max_idle_conns)
            .field("conn_max_lifetime", &self.conn_max_lifetime)
            .field("conn_max_idle_time", &self.conn_max_idle_time)
            .field("connect_timeout", &self.connect_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl PostgresConfig {
    /// Create a configuration with default pool sizing and retry policy.
    pub fn new(host: &str, port: u16, user: &str, password: &str, database: &str) -> Self {
        Self {
            host: host.to_owned(),
            port,
            user: user.to_owned(),
            password: password.to_owned(),
            database: database.to_owned(),
            max_open_conns: DEFAULT_MAX_OPEN_CONNS,
            max_idle_conns: DEFAULT_MAX_IDLE_CONNS,
            conn_max_lifetime: Duration::from_secs(DEFAULT_CONN_MAX_LIFETIME_SECS),
            conn_max_idle_time: Duration::from_secs(DEFAULT_CONN_MAX_IDLE_TIME_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }

    /// Set the maximum number of open connections.
    #[must_use]
    pub const fn with_max_open_conns(mut self, max: u32) -> Self {
        self.max_open_conns = max;
        self
    }

    /// Set the number of connections retained after idle reaping.
    #[must_use]
    pub const fn with_max_idle_conns(mut self, max: u32) -> Self {
        self.max_idle_conns = max;
        self
    }

    /// Set the maximum connection lifetime.
    #[must_use]
    pub const fn with_conn_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.conn_max_lifetime = lifetime;
        self
    }

    /// Set the idle time after which a connection is closed.
    #[must_use]
    pub const fn with_conn_max_idle_time(mut self, idle: Duration) -> Self {
        self.conn_max_idle_time = idle;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the startup retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }

    /// Pool sizing policy.
    ///
    /// sqlx keeps up to `max_connections` open and reaps idle ones down to
    /// `min_connections`, so the idle cap maps onto the minimum.
    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_open_conns)
            .min_connections(self.max_idle_conns.min(self.max_open_conns))
            .acquire_timeout(self.connect_timeout)
            .max_lifetime(self.conn_max_lifetime)
            .idle_timeout(self.conn_max_idle_time)
    }
}

/// Connection pool handle to `PostgreSQL`.
///
/// Wraps a [`sqlx::PgPool`]; cloning is cheap and shares the pool.
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
}

impl PostgresPool {
    /// Connect to `PostgreSQL`, retrying with exponential backoff until the
    /// configured time budget runs out.
    ///
    /// Each attempt opens the pool and pings one connection. Failed attempts
    /// are logged with the cause and the delay before the next attempt.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ConnectExhausted`] carrying the last failure once
    /// the budget is spent. The store cannot operate without a connection,
    /// so callers treat this as fatal.
    pub async fn connect_with_retry(config: &PostgresConfig) -> Result<Self, DbError> {
        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Connecting to PostgreSQL"
        );

        let connected = retry::retry_notify(
            &config.retry,
            || Self::connect_once(config),
            |err, delay| {
                tracing::warn!(
                    error = %err,
                    next_attempt_in = ?delay,
                    "PostgreSQL connection failed, retrying"
                );
            },
        )
        .await;

        match connected {
            Ok(pool) => {
                tracing::info!(
                    max_open_conns = config.max_open_conns,
                    max_idle_conns = config.max_idle_conns,
                    "Connected to PostgreSQL"
                );
                Ok(pool)
            }
            Err(exhausted) => Err(DbError::ConnectExhausted {
                attempts: exhausted.attempts,
                elapsed: exhausted.elapsed,
                source: Box::new(exhausted.last),
            }),
        }
    }

    /// One connection attempt: build the pool, then ping.
    async fn connect_once(config: &PostgresConfig) -> Result<Self, DbError> {
        let pool = config
            .pool_options()
            .connect_with(config.connect_options())
            .await?;

        let mut conn = pool.acquire().await?;
        conn.ping().await?;
        drop(conn);

        Ok(Self { pool })
    }

    /// Return a reference to the underlying [`PgPool`].
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close all connections in the pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }
}
