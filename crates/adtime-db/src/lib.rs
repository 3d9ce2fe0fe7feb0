//! Storage layer for the adtime order-taking bot (`PostgreSQL` + `Dragonfly`).
//!
//! `PostgreSQL` is the source of truth for orders, the texture catalog and
//! user consent. `Dragonfly` (or any Redis-compatible server) caches hot
//! reads, holds the statistics snapshot and counts rate-limited actions.
//! Every cached value can be rebuilt from the database.
//!
//! # Architecture
//!
//! ```text
//! Bot handlers
//!     |
//!     +-- Storage ------------------------------------------+
//!         |-- Repository (PostgresPool | MemoryRepository) |
//!         |   |-- OrderStore      (orders, soft delete)     |
//!         |   |-- TextureStore    (catalog reads)           |
//!         |   +-- AgreementStore  (consent upserts)         |
//!         |-- read_through  (texture:{id}, order_stats)     |
//!         |-- RateLimiter   (ratelimit:{user}:{action})     |
//!         +-- CacheClient (DragonflyPool | MemoryCache) ----+
//! ```
//!
//! # Modules
//!
//! - [`storage`] -- The facade callers use
//! - [`repository`] -- Dispatch over the authoritative backends
//! - [`order_store`] -- Order persistence and soft-delete visibility
//! - [`texture_store`] -- Texture catalog reads
//! - [`agreement_store`] -- User consent records
//! - [`statistics`] -- Order statistics aggregation
//! - [`cache`] -- Cache dispatch, key builders and TTLs
//! - [`read_through`] -- Validated and trusting read-through helpers
//! - [`rate_limit`] -- Fixed-window rate limiting
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) operations
//! - [`postgres`] -- `PostgreSQL` pool configuration and connection with retry
//! - [`retry`] -- Exponential backoff
//! - [`memory`] -- In-process substitutes for both services
//! - [`error`] -- Shared error types

pub mod agreement_store;
pub mod cache;
pub mod dragonfly;
pub mod error;
pub mod memory;
pub mod order_store;
pub mod postgres;
pub mod rate_limit;
pub mod read_through;
pub mod repository;
pub mod retry;
pub mod statistics;
pub mod storage;
pub mod texture_store;

// Re-export primary types for convenience.
pub use agreement_store::AgreementStore;
pub use cache::CacheClient;
pub use dragonfly::DragonflyPool;
pub use error::{DbError, Entity};
pub use memory::{MemoryCache, MemoryRepository};
pub use order_store::{OrderRow, OrderStore, Visibility};
pub use postgres::{PostgresConfig, PostgresPool};
pub use rate_limit::RateLimiter;
pub use repository::Repository;
pub use retry::RetryPolicy;
pub use statistics::StatsWindow;
pub use storage::{Storage, StorageConfig};
pub use texture_store::{TextureRow, TextureStore};
