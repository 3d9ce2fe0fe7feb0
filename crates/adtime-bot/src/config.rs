//! Configuration loading and typed config structures for the bot.
//!
//! The configuration lives in `adtime-config.yaml` in the working directory
//! (or wherever `ADTIME_CONFIG` points). Every field has a default, so a
//! missing file or a partial one is valid. Connection settings can be
//! overridden from the environment, which is how Docker deployments supply
//! them.

use std::path::Path;
use std::time::Duration;

use adtime_db::{PostgresConfig, RetryPolicy, StorageConfig};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for {name}")]
    Env {
        /// The variable name.
        name: &'static str,
        /// The raw value.
        value: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level bot configuration.
///
/// Mirrors the structure of `adtime-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppConfig {
    /// `PostgreSQL` connection and pool settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Redis-compatible cache connection.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Storage layer tunables.
    #[serde(default)]
    pub storage: StorageSection,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Env`] if an override does not parse.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Env`] if an override does not parse.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for when no file exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] if an override does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override connection settings with environment variables when set.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `DATABASE_HOST` | `database.host` |
    /// | `DATABASE_PORT` | `database.port` |
    /// | `DATABASE_USER` | `database.user` |
    /// | `DATABASE_PASSWORD` | `database.password` |
    /// | `DATABASE_NAME` | `database.name` |
    /// | `REDIS_ADDR` | `cache.addr` |
    /// | `REDIS_PASSWORD` | `cache.password` |
    /// | `REDIS_DB` | `cache.db` |
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] if a numeric variable does not parse.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source.
    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("DATABASE_HOST") {
            self.database.host = val;
        }
        if let Some(val) = lookup("DATABASE_PORT") {
            self.database.port = parse_env("DATABASE_PORT", val)?;
        }
        if let Some(val) = lookup("DATABASE_USER") {
            self.database.user = val;
        }
        if let Some(val) = lookup("DATABASE_PASSWORD") {
            self.database.password = val;
        }
        if let Some(val) = lookup("DATABASE_NAME") {
            self.database.name = val;
        }
        if let Some(val) = lookup("REDIS_ADDR") {
            self.cache.addr = val;
        }
        if let Some(val) = lookup("REDIS_PASSWORD") {
            self.cache.password = val;
        }
        if let Some(val) = lookup("REDIS_DB") {
            self.cache.db = parse_env("REDIS_DB", val)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    match value.trim().parse() {
        Ok(parsed) => Ok(parsed),
        Err(_) => Err(ConfigError::Env { name, value }),
    }
}

/// `PostgreSQL` configuration.
#[derive(Clone, PartialEq, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    #[serde(default = "default_db_host")]
    pub host: String,

    /// Database port.
    #[serde(default = "default_db_port")]
    pub port: u16,

    /// Login role.
    #[serde(default = "default_db_user")]
    pub user: String,

    /// Login password.
    #[serde(default)]
    pub password: String,

    /// Database name.
    #[serde(default = "default_db_name")]
    pub name: String,

    /// Maximum open connections.
    #[serde(default = "default_max_open_conns")]
    pub max_open_conns: u32,

    /// Connections retained after idle reaping.
    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns: u32,

    /// Maximum connection lifetime in seconds.
    #[serde(default = "default_conn_max_lifetime_secs")]
    pub conn_max_lifetime_secs: u64,

    /// Idle time before a connection is closed, in seconds.
    #[serde(default = "default_conn_max_idle_time_secs")]
    pub conn_max_idle_time_secs: u64,

    /// Timeout for opening a connection, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Startup retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl core::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("max_open_conns", &self.max_open_conns)
            .field("max_idle_conns", &self.max_idle_conns)
            .field("conn_max_lifetime_secs", &self.conn_max_lifetime_secs)
            .field("conn_max_idle_time_secs", &self.conn_max_idle_time_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

impl DatabaseConfig {
    /// Build the pool configuration.
    pub fn to_postgres_config(&self) -> PostgresConfig {
        PostgresConfig::new(
            &self.host,
            self.port,
            &self.user,
            &self.password,
            &self.name,
        )
        .with_max_open_conns(self.max_open_conns)
        .with_max_idle_conns(self.max_idle_conns)
        .with_conn_max_lifetime(Duration::from_secs(self.conn_max_lifetime_secs))
        .with_conn_max_idle_time(Duration::from_secs(self.conn_max_idle_time_secs))
        .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
        .with_retry(self.retry.to_policy())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: String::new(),
            name: default_db_name(),
            max_open_conns: default_max_open_conns(),
            max_idle_conns: default_max_idle_conns(),
            conn_max_lifetime_secs: default_conn_max_lifetime_secs(),
            conn_max_idle_time_secs: default_conn_max_idle_time_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff settings for the startup connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,

    /// Growth factor between delays.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Cap on a single delay, in milliseconds.
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    /// Total time budget, in seconds.
    #[serde(default = "default_max_elapsed_secs")]
    pub max_elapsed_secs: u64,
}

impl RetryConfig {
    /// Build the retry policy.
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_initial_interval(Duration::from_millis(self.initial_interval_ms))
            .with_multiplier(self.multiplier)
            .with_max_interval(Duration::from_millis(self.max_interval_ms))
            .with_max_elapsed_time(Duration::from_secs(self.max_elapsed_secs))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            multiplier: default_multiplier(),
            max_interval_ms: default_max_interval_ms(),
            max_elapsed_secs: default_max_elapsed_secs(),
        }
    }
}

/// Cache (Dragonfly / Redis) configuration.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// `host:port` of the server.
    #[serde(default = "default_cache_addr")]
    pub addr: String,

    /// Password, empty for none.
    #[serde(default)]
    pub password: String,

    /// Logical database index.
    #[serde(default)]
    pub db: u8,
}

impl core::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("addr", &self.addr)
            .field("password", &"<redacted>")
            .field("db", &self.db)
            .finish()
    }
}

impl CacheConfig {
    /// Connection URL in the `redis://host:port/db` form.
    ///
    /// The password is never part of the URL; pass [`Self::password`] to
    /// the client separately.
    pub fn url(&self) -> String {
        format!("redis://{}/{}", self.addr, self.db)
    }

    /// The password, or `None` when it is empty.
    pub fn password(&self) -> Option<&str> {
        Some(self.password.as_str()).filter(|p| !p.is_empty())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            addr: default_cache_addr(),
            password: String::new(),
            db: 0,
        }
    }
}

/// Storage layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageSection {
    /// Deadline for a single storage operation, in milliseconds.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

impl StorageSection {
    /// Build the storage configuration.
    pub fn to_storage_config(&self) -> StorageConfig {
        StorageConfig::default()
            .with_operation_timeout(Duration::from_millis(self.operation_timeout_ms))
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_db_host() -> String {
    String::from("localhost")
}

const fn default_db_port() -> u16 {
    5432
}

fn default_db_user() -> String {
    String::from("adtime")
}

fn default_db_name() -> String {
    String::from("adtime")
}

const fn default_max_open_conns() -> u32 {
    25
}

const fn default_max_idle_conns() -> u32 {
    5
}

const fn default_conn_max_lifetime_secs() -> u64 {
    1800
}

const fn default_conn_max_idle_time_secs() -> u64 {
    300
}

const fn default_connect_timeout_secs() -> u64 {
    5
}

const fn default_initial_interval_ms() -> u64 {
    500
}

const fn default_multiplier() -> f64 {
    1.5
}

const fn default_max_interval_ms() -> u64 {
    15_000
}

const fn default_max_elapsed_secs() -> u64 {
    120
}

fn default_cache_addr() -> String {
    String::from("localhost:6379")
}

const fn default_operation_timeout_ms() -> u64 {
    10_000
}

fn default_log_level() -> String {
    String::from("info")
}
