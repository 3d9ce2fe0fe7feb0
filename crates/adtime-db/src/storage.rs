//! The storage facade used by the bot.
//!
//! [`Storage`] owns the repository, the cache handle and the rate limiter,
//! and implements every operation callers need:
//!
//! | Operation | Store | Cache |
//! |-----------|-------|-------|
//! | [`save_order`](Storage::save_order) | insert | invalidates `order_stats` |
//! | [`get_order_by_id`](Storage::get_order_by_id) | point read | - |
//! | [`get_user_orders`](Storage::get_user_orders) | list | - |
//! | [`list_orders`](Storage::list_orders) | list | - |
//! | [`delete_user_data`](Storage::delete_user_data) | soft delete | invalidates `order_stats` |
//! | [`update_order_status`](Storage::update_order_status) | update | invalidates `order_stats` |
//! | [`save_user_agreement`](Storage::save_user_agreement) | upsert | - |
//! | [`get_user_agreement`](Storage::get_user_agreement) | point read | - |
//! | [`get_texture_by_id`](Storage::get_texture_by_id) | on miss | `texture:{id}`, validated, 24h |
//! | [`get_texture_by_name`](Storage::get_texture_by_name) | point read | - |
//! | [`get_available_textures`](Storage::get_available_textures) | list | - |
//! | [`get_order_statistics`](Storage::get_order_statistics) | on miss | `order_stats`, 1h |
//! | [`check_rate_limit`](Storage::check_rate_limit) | - | `ratelimit:{user}:{action}` |
//!
//! Every operation is bounded by [`StorageConfig::operation_timeout`]. For
//! writes the deadline covers the store round trip only; invalidation runs
//! afterwards, under its own deadline, whenever the write changed rows or
//! its outcome is unknown (an error or a timeout may follow a commit). A
//! failed invalidation is logged and does not fail the write; the stale
//! entry expires with its TTL.

use std::future::Future;
use std::time::Duration;

use adtime_types::{
    NewOrder, Order, OrderId, OrderStatistics, OrderStatus, RateLimitAction, Texture, TextureId,
    UserAgreement, UserId,
};
use chrono::Utc;

use crate::cache::{self, CacheClient};
use crate::error::{DbError, Entity};
use crate::order_store::Visibility;
use crate::rate_limit::RateLimiter;
use crate::read_through;
use crate::repository::Repository;
use crate::statistics;

/// Default deadline for a single storage operation.
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 10_000;

/// Tunables for [`Storage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Deadline for one operation, cache and store round trips included.
    pub operation_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
        }
    }
}

impl StorageConfig {
    /// Set the per-operation deadline.
    #[must_use]
    pub const fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

/// Orders, catalog, consent, statistics and rate limits behind one handle.
///
/// Cloning is cheap and shares the underlying pools.
#[derive(Clone)]
pub struct Storage {
    repo: Repository,
    cache: CacheClient,
    limiter: RateLimiter,
    config: StorageConfig,
}

impl Storage {
    /// Build a storage layer with default settings.
    pub fn new(repo: impl Into<Repository>, cache: impl Into<CacheClient>) -> Self {
        Self::with_config(repo, cache, StorageConfig::default())
    }

    /// Build a storage layer with explicit settings.
    pub fn with_config(
        repo: impl Into<Repository>,
        cache: impl Into<CacheClient>,
        config: StorageConfig,
    ) -> Self {
        let cache = cache.into();
        Self {
            repo: repo.into(),
            limiter: RateLimiter::new(cache.clone()),
            cache,
            config,
        }
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Persist a new order and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Operation`] if the insert fails. Nothing is
    /// retried.
    pub async fn save_order(&self, order: &NewOrder) -> Result<OrderId, DbError> {
        self.write_then_invalidate(
            "save order",
            async {
                let id = self
                    .repo
                    .insert_order(order, Utc::now())
                    .await
                    .map_err(|e| e.context("save order", format!("user {}", order.user_id)))?;

                tracing::info!(
                    order_id = %id,
                    user_id = %order.user_id,
                    texture_id = %order.texture_id,
                    price = %order.price,
                    "Order saved"
                );
                Ok(id)
            },
            |_| true,
        )
        .await
    }

    /// Fetch an active order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if no active order has this id.
    /// Returns [`DbError::Operation`] if the query fails.
    pub async fn get_order_by_id(&self, id: OrderId) -> Result<Order, DbError> {
        self.bounded("get order", async {
            self.repo
                .find_order(id, Visibility::Active)
                .await
                .map_err(|e| e.context("get order", id))?
                .ok_or_else(|| DbError::NotFound {
                    entity: Entity::Order,
                    id: id.to_string(),
                })
        })
        .await
    }

    /// Active orders of a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Operation`] if the query fails.
    pub async fn get_user_orders(&self, user_id: UserId) -> Result<Vec<Order>, DbError> {
        self.bounded("get user orders", async {
            self.repo
                .list_orders(Some(user_id), Visibility::Active)
                .await
                .map_err(|e| e.context("get user orders", format!("user {user_id}")))
        })
        .await
    }

    /// Every order, newest first, for reports.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Operation`] if the query fails.
    pub async fn list_orders(&self, visibility: Visibility) -> Result<Vec<Order>, DbError> {
        self.bounded("list orders", async {
            self.repo
                .list_orders(None, visibility)
                .await
                .map_err(|e| e.context("list orders", "all"))
        })
        .await
    }

    /// Soft-delete every active order of a user and return how many were
    /// deleted. Calling it again returns zero.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Operation`] if the update fails.
    pub async fn delete_user_data(&self, user_id: UserId) -> Result<u64, DbError> {
        self.write_then_invalidate(
            "delete user data",
            async {
                let affected = self
                    .repo
                    .soft_delete_user_orders(user_id, Utc::now())
                    .await
                    .map_err(|e| e.context("delete user data", format!("user {user_id}")))?;

                tracing::info!(%user_id, orders = affected, "User data deleted");
                Ok(affected)
            },
            |affected| *affected > 0,
        )
        .await
    }

    /// Move an active order to `status`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if no active order has this id.
    /// Returns [`DbError::Operation`] if the update fails.
    pub async fn update_order_status(&self, id: OrderId, status: OrderStatus) -> Result<(), DbError> {
        let updated = self
            .write_then_invalidate(
                "update order status",
                async {
                    self.repo
                        .update_order_status(id, status, Utc::now())
                        .await
                        .map_err(|e| e.context("update order status", id))
                },
                |updated| *updated,
            )
            .await?;

        if !updated {
            return Err(DbError::NotFound {
                entity: Entity::Order,
                id: id.to_string(),
            });
        }

        tracing::info!(order_id = %id, %status, "Order status updated");
        Ok(())
    }

    // =========================================================================
    // Consent
    // =========================================================================

    /// Record that a user agreed to data processing, with their phone.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Operation`] if the upsert fails.
    pub async fn save_user_agreement(&self, user_id: UserId, phone: &str) -> Result<(), DbError> {
        self.bounded("save user agreement", async {
            self.repo
                .upsert_agreement(user_id, phone)
                .await
                .map_err(|e| e.context("save user agreement", format!("user {user_id}")))?;
            tracing::debug!(%user_id, "User agreement saved");
            Ok(())
        })
        .await
    }

    /// A user's consent. Users who never answered get the default
    /// (not agreed, empty phone).
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Operation`] if the query fails.
    pub async fn get_user_agreement(&self, user_id: UserId) -> Result<UserAgreement, DbError> {
        self.bounded("get user agreement", async {
            let found = self
                .repo
                .find_agreement(user_id)
                .await
                .map_err(|e| e.context("get user agreement", format!("user {user_id}")))?;
            Ok(found.unwrap_or_default())
        })
        .await
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Fetch a texture, serving it from the cache when a valid copy exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if the catalog has no such texture.
    /// Returns [`DbError::InvalidPrice`] if the stored price is not positive.
    /// Returns [`DbError::Operation`] if the query fails.
    pub async fn get_texture_by_id(&self, id: &TextureId) -> Result<Texture, DbError> {
        self.bounded("get texture", async {
            read_through::validated(
                &self.cache,
                &cache::texture_key(id),
                cache::TEXTURE_TTL,
                validate_texture,
                || async {
                    self.repo
                        .find_texture(id)
                        .await
                        .map_err(|e| e.context("get texture", id))?
                        .ok_or_else(|| DbError::NotFound {
                            entity: Entity::Texture,
                            id: id.to_string(),
                        })
                },
            )
            .await
        })
        .await
    }

    /// Fetch a texture by display name. Not cached.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if no texture has this name.
    /// Returns [`DbError::Operation`] if the query fails.
    pub async fn get_texture_by_name(&self, name: &str) -> Result<Texture, DbError> {
        self.bounded("get texture by name", async {
            self.repo
                .find_texture_by_name(name)
                .await
                .map_err(|e| e.context("get texture by name", name))?
                .ok_or_else(|| DbError::NotFound {
                    entity: Entity::Texture,
                    id: name.to_owned(),
                })
        })
        .await
    }

    /// In-stock textures ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Operation`] if the query fails.
    pub async fn get_available_textures(&self) -> Result<Vec<Texture>, DbError> {
        self.bounded("get available textures", async {
            self.repo
                .list_available_textures()
                .await
                .map_err(|e| e.context("get available textures", "in stock"))
        })
        .await
    }

    // =========================================================================
    // Statistics and rate limits
    // =========================================================================

    /// Aggregated order statistics, cached for an hour.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Operation`] naming the first aggregate query that
    /// failed. A failed computation is not cached.
    pub async fn get_order_statistics(&self) -> Result<OrderStatistics, DbError> {
        self.bounded("get order statistics", async {
            read_through::trusting(
                &self.cache,
                cache::ORDER_STATS_KEY,
                cache::ORDER_STATS_TTL,
                || statistics::compute(&self.repo),
            )
            .await
        })
        .await
    }

    /// Count one `action` by `user_id`; `true` means the user exceeded
    /// `limit` within the current `window` and should be refused.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Operation`] if the cache cannot be updated.
    pub async fn check_rate_limit(
        &self,
        user_id: UserId,
        action: RateLimitAction,
        limit: u32,
        window: Duration,
    ) -> Result<bool, DbError> {
        self.bounded("check rate limit", async {
            self.limiter
                .check(user_id, action, limit, window)
                .await
                .map_err(|e| e.context("check rate limit", format!("user {user_id}")))
        })
        .await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the database pool and the cache connection.
    ///
    /// # Errors
    ///
    /// Returns the cache error if the connection does not close cleanly.
    /// The database pool is closed regardless.
    pub async fn close(&self) -> Result<(), DbError> {
        self.repo.close().await;
        self.cache.close().await
    }

    /// Run the write `operation` under the deadline, then drop the cached
    /// statistics unless `changed` says the write touched nothing.
    ///
    /// Errors and timeouts always invalidate: the write may have committed
    /// before the failure was observed.
    async fn write_then_invalidate<T, F, C>(
        &self,
        operation: &'static str,
        fut: F,
        changed: C,
    ) -> Result<T, DbError>
    where
        F: Future<Output = Result<T, DbError>>,
        C: FnOnce(&T) -> bool,
    {
        let result = self.bounded(operation, fut).await;
        let stale = result.as_ref().map_or(true, changed);
        if stale {
            self.invalidate_statistics().await;
        }
        result
    }

    /// Drop the cached statistics snapshot, logging a failure.
    async fn invalidate_statistics(&self) {
        let after = self.config.operation_timeout;
        let deleted = tokio::time::timeout(after, self.cache.delete(cache::ORDER_STATS_KEY)).await;
        match deleted {
            Ok(Ok(())) => tracing::debug!("Order statistics invalidated"),
            Ok(Err(err)) => tracing::warn!(
                error = %err,
                key = cache::ORDER_STATS_KEY,
                "Failed to invalidate order statistics"
            ),
            Err(_elapsed) => tracing::warn!(
                ?after,
                key = cache::ORDER_STATS_KEY,
                "Order statistics invalidation timed out"
            ),
        }
    }

    /// Run `operation` under the configured deadline.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, DbError>
    where
        F: Future<Output = Result<T, DbError>>,
    {
        let after = self.config.operation_timeout;
        match tokio::time::timeout(after, fut).await {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::warn!(operation, ?after, "Storage operation timed out");
                Err(DbError::Timeout { operation, after })
            }
        }
    }
}

/// Reject textures whose price is not strictly positive.
fn validate_texture(texture: &Texture) -> Result<(), DbError> {
    if texture.has_valid_price() {
        Ok(())
    } else {
        Err(DbError::InvalidPrice {
            texture_id: texture.id.to_string(),
            price: texture.price_per_dm2,
        })
    }
}
