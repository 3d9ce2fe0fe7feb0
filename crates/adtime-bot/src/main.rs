//! Process host for the adtime storage layer.
//!
//! Loads configuration, opens the cache and database connections, builds
//! the [`Storage`] facade the bot handlers use, and keeps it alive until the
//! process is asked to stop.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `adtime-config.yaml` (or `ADTIME_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect to the cache
//! 4. Connect to `PostgreSQL`, retrying with backoff (fatal on exhaustion)
//! 5. Build the storage layer
//! 6. Log a statistics snapshot
//! 7. Wait for Ctrl-C or SIGTERM, then close both connections

mod config;
mod error;

use std::path::PathBuf;

use adtime_db::{DragonflyPool, PostgresPool, Storage};
use adtime_types::OrderStatistics;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::error::BotError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "adtime-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid, a connection cannot be
/// established, or a signal handler cannot be installed.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging depends on it, so report the source
    //    once the subscriber is installed.
    let (config, source) = load_config()?;

    // 2. Initialize structured logging.
    let fallback = config.logging.level.clone();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_target(true)
        .init();

    info!("adtime-bot starting");
    match &source {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Config file not found, using defaults"),
    }
    info!(
        database_host = %config.database.host,
        database_port = config.database.port,
        database_name = %config.database.name,
        cache_addr = %config.cache.addr,
        operation_timeout_ms = config.storage.operation_timeout_ms,
        "Effective configuration"
    );

    // 3. Connect to the cache.
    let cache = DragonflyPool::connect_with_password(&config.cache.url(), config.cache.password())
        .await
        .map_err(BotError::from)?;

    // 4. Connect to PostgreSQL.
    let postgres = PostgresPool::connect_with_retry(&config.database.to_postgres_config())
        .await
        .map_err(BotError::from)?;

    // 5. Build the storage layer.
    let storage = Storage::with_config(postgres, cache, config.storage.to_storage_config());
    info!("Storage layer ready");

    // 6. Log a statistics snapshot.
    match storage.get_order_statistics().await {
        Ok(stats) => log_statistics(&stats),
        Err(e) => tracing::warn!(error = %e, "Failed to load order statistics"),
    }

    // 7. Run until asked to stop.
    shutdown_signal().await.map_err(BotError::from)?;

    storage.close().await.map_err(BotError::from)?;
    info!("adtime-bot stopped");
    Ok(())
}

/// Load configuration from `ADTIME_CONFIG` or `adtime-config.yaml`.
///
/// Returns the path the configuration was read from, or `None` if no file
/// exists and defaults (plus environment overrides) are used.
fn load_config() -> Result<(AppConfig, Option<PathBuf>), BotError> {
    let path = std::env::var_os("ADTIME_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);

    if path.exists() {
        let config = AppConfig::from_file(&path)?;
        Ok((config, Some(path)))
    } else {
        Ok((AppConfig::from_env()?, None))
    }
}

fn log_statistics(stats: &OrderStatistics) {
    info!(
        total_orders = stats.total.orders,
        total_revenue = %stats.total.revenue,
        today_orders = stats.today.orders,
        week_orders = stats.week.orders,
        month_orders = stats.month.orders,
        month_revenue = %stats.month.revenue,
        "Order statistics"
    );
    for (status, count) in &stats.status_counts {
        tracing::debug!(%status, count, "Orders by status");
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() -> Result<(), std::io::Error> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, starting graceful shutdown");
    Ok(())
}
