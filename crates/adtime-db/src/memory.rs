//! In-process substitutes for `Dragonfly` and `PostgreSQL`.
//!
//! [`MemoryCache`] and [`MemoryRepository`] implement the same operations
//! as [`DragonflyPool`](crate::dragonfly::DragonflyPool) and the
//! `PostgreSQL` stores, with the same observable semantics: key expiry,
//! `INCR` keeping an existing TTL, soft-delete visibility, newest-first
//! ordering. They plug into [`CacheClient`](crate::cache::CacheClient) and
//! [`Repository`](crate::repository::Repository) so the storage layer can
//! run without live services.
//!
//! Expiry uses [`tokio::time::Instant`], so tests can drive TTLs with a
//! paused clock. [`MemoryRepository`] counts every query it serves and can
//! be told to fail the next few queries.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use adtime_types::{
    NewOrder, Order, OrderId, OrderStatus, PeriodTotals, Texture, TextureId, UserAgreement, UserId,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::DbError;
use crate::order_store::Visibility;
use crate::statistics::StatsWindow;

// =========================================================================
// Cache
// =========================================================================

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-process stand-in for a Redis-compatible cache.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `value` as JSON and store it at `key`, expiring after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if serialization fails.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), DbError> {
        let json = serde_json::to_string(value)?;
        let expires_at = Instant::now().checked_add(ttl);
        self.entries.lock().await.insert(
            key.to_owned(),
            CacheEntry {
                value: json,
                expires_at,
            },
        );
        Ok(())
    }

    /// Read the value at `key` and deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::KeyNotFound`] if the key is absent or expired.
    /// Returns [`DbError::Serialization`] if deserialization fails.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T, DbError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(serde_json::from_str(&entry.value)?),
            _ => Err(DbError::KeyNotFound(key.to_owned())),
        }
    }

    /// Delete a key. Deleting a missing key is not an error.
    pub async fn delete(&self, key: &str) -> Result<(), DbError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    /// Increment the integer at `key`, keeping its expiry.
    ///
    /// A missing or expired key counts from zero and gets no expiry.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Backend`] if the stored value is not an integer
    /// or the increment would overflow.
    pub async fn incr(&self, key: &str) -> Result<i64, DbError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let (current, expires_at) = match entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                let value = entry.value.parse::<i64>().map_err(|e| {
                    DbError::Backend(format!("value at {key} is not an integer: {e}"))
                })?;
                (value, entry.expires_at)
            }
            _ => (0, None),
        };

        let next = current
            .checked_add(1)
            .ok_or_else(|| DbError::Backend(format!("increment of {key} would overflow")))?;

        entries.insert(
            key.to_owned(),
            CacheEntry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    /// Set `key` to expire after `ttl` unless it already has an expiry.
    ///
    /// Returns `false` if the key does not exist or already expires.
    pub async fn expire_if_unset(&self, key: &str, ttl: Duration) -> Result<bool, DbError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) && entry.expires_at.is_none() => {
                entry.expires_at = now.checked_add(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Whether `key` currently holds a live value.
    pub async fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .get(key)
            .is_some_and(|entry| entry.is_live(now))
    }

    /// Remaining time to live of `key`, if it exists and has an expiry.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }
}

// =========================================================================
// Repository
// =========================================================================

#[derive(Debug, Default)]
struct RepoState {
    orders: Vec<Order>,
    last_order_id: i64,
    textures: BTreeMap<TextureId, Texture>,
    agreements: BTreeMap<UserId, UserAgreement>,
}

#[derive(Debug, Default)]
struct RepoShared {
    state: Mutex<RepoState>,
    queries: AtomicU64,
    pending_failures: AtomicU32,
    write_delay_ms: AtomicU64,
}

/// In-process stand-in for the `PostgreSQL` tables.
///
/// Cloning shares the underlying tables and counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    shared: Arc<RepoShared>,
}

impl MemoryRepository {
    /// Create empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queries served so far (seeding helpers are not counted).
    pub fn query_count(&self) -> u64 {
        self.shared.queries.load(Ordering::SeqCst)
    }

    /// Make the next `count` queries fail with [`DbError::Backend`].
    pub fn fail_next(&self, count: u32) {
        self.shared.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next write stall for `delay` after it has been applied,
    /// like a commit whose acknowledgement is slow to arrive.
    pub fn delay_next_write(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.shared.write_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Add or replace a catalog entry without counting a query.
    pub async fn put_texture(&self, texture: Texture) {
        self.shared
            .state
            .lock()
            .await
            .textures
            .insert(texture.id.clone(), texture);
    }

    /// Move an order's creation time, e.g. to place it outside a
    /// statistics window. Not counted as a query.
    pub async fn backdate_order(&self, id: OrderId, created_at: DateTime<Utc>) {
        let mut state = self.shared.state.lock().await;
        if let Some(order) = state.orders.iter_mut().find(|o| o.id == id) {
            order.created_at = created_at;
        }
    }

    /// Count a query and consume one injected failure, if any.
    fn begin_query(&self) -> Result<(), DbError> {
        self.shared.queries.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .shared
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(DbError::Backend(String::from("injected query failure")));
        }
        Ok(())
    }

    /// Consume and wait out an injected write delay, if any.
    async fn finish_write(&self) {
        let millis = self.shared.write_delay_ms.swap(0, Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    pub(crate) async fn insert_order(
        &self,
        order: &NewOrder,
        created_at: DateTime<Utc>,
    ) -> Result<OrderId, DbError> {
        self.begin_query()?;
        let id = {
            let mut state = self.shared.state.lock().await;
            let next = state
                .last_order_id
                .checked_add(1)
                .ok_or_else(|| DbError::Backend(String::from("order id sequence exhausted")))?;
            state.last_order_id = next;
            let id = OrderId(next);
            state
                .orders
                .push(Order::from_new(id, order.clone(), created_at));
            id
        };
        self.finish_write().await;
        Ok(id)
    }

    pub(crate) async fn find_order(
        &self,
        id: OrderId,
        visibility: Visibility,
    ) -> Result<Option<Order>, DbError> {
        self.begin_query()?;
        let state = self.shared.state.lock().await;
        Ok(state
            .orders
            .iter()
            .find(|o| o.id == id && visibility.admits(o))
            .cloned())
    }

    pub(crate) async fn list_orders(
        &self,
        user_id: Option<UserId>,
        visibility: Visibility,
    ) -> Result<Vec<Order>, DbError> {
        self.begin_query()?;
        let state = self.shared.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| visibility.admits(o) && user_id.is_none_or(|u| o.user_id == u))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    pub(crate) async fn soft_delete_user_orders(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        self.begin_query()?;
        let mut affected: u64 = 0;
        {
            let mut state = self.shared.state.lock().await;
            for order in state
                .orders
                .iter_mut()
                .filter(|o| o.user_id == user_id && Visibility::Active.admits(o))
            {
                order.deleted_at = Some(at);
                order.updated_at = at;
                affected = affected.saturating_add(1);
            }
        }
        self.finish_write().await;
        Ok(affected)
    }

    pub(crate) async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        self.begin_query()?;
        let updated = {
            let mut state = self.shared.state.lock().await;
            state
                .orders
                .iter_mut()
                .find(|o| o.id == id && Visibility::Active.admits(o))
                .map(|order| {
                    order.status = status;
                    order.updated_at = at;
                })
                .is_some()
        };
        self.finish_write().await;
        Ok(updated)
    }

    pub(crate) async fn find_texture(&self, id: &TextureId) -> Result<Option<Texture>, DbError> {
        self.begin_query()?;
        Ok(self.shared.state.lock().await.textures.get(id).cloned())
    }

    /// The first texture named `name`, by id.
    pub(crate) async fn find_texture_by_name(&self, name: &str) -> Result<Option<Texture>, DbError> {
        self.begin_query()?;
        Ok(self
            .shared
            .state
            .lock()
            .await
            .textures
            .values()
            .find(|t| t.name == name)
            .cloned())
    }

    pub(crate) async fn list_available_textures(&self) -> Result<Vec<Texture>, DbError> {
        self.begin_query()?;
        let state = self.shared.state.lock().await;
        let mut textures: Vec<Texture> = state
            .textures
            .values()
            .filter(|t| t.in_stock)
            .cloned()
            .collect();
        textures.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(textures)
    }

    pub(crate) async fn upsert_agreement(&self, user_id: UserId, phone: &str) -> Result<(), DbError> {
        self.begin_query()?;
        self.shared.state.lock().await.agreements.insert(
            user_id,
            UserAgreement {
                agreed: true,
                phone: phone.to_owned(),
            },
        );
        Ok(())
    }

    pub(crate) async fn find_agreement(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserAgreement>, DbError> {
        self.begin_query()?;
        Ok(self
            .shared
            .state
            .lock()
            .await
            .agreements
            .get(&user_id)
            .cloned())
    }

    pub(crate) async fn period_totals(&self, window: StatsWindow) -> Result<PeriodTotals, DbError> {
        self.begin_query()?;
        let cutoff = window.cutoff(Utc::now());
        let state = self.shared.state.lock().await;
        let totals = state
            .orders
            .iter()
            .filter(|o| Visibility::Active.admits(o))
            .filter(|o| cutoff.is_none_or(|c| o.created_at >= c))
            .fold(PeriodTotals::default(), |acc, o| PeriodTotals {
                orders: acc.orders.saturating_add(1),
                revenue: acc.revenue.saturating_add(o.price),
            });
        Ok(totals)
    }

    pub(crate) async fn status_counts(&self) -> Result<BTreeMap<OrderStatus, u64>, DbError> {
        self.begin_query()?;
        let state = self.shared.state.lock().await;
        let mut counts = BTreeMap::new();
        for order in state.orders.iter().filter(|o| Visibility::Active.admits(o)) {
            let count: &mut u64 = counts.entry(order.status).or_default();
            *count = count.saturating_add(1);
        }
        Ok(counts)
    }
}
