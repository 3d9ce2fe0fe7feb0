//! The authoritative store behind [`Storage`](crate::storage::Storage).
//!
//! [`Repository`] dispatches to either the `PostgreSQL` stores or the
//! in-process [`MemoryRepository`]. Both variants share one method set, so
//! the storage layer is written once against this enum.

use std::collections::BTreeMap;

use adtime_types::{
    NewOrder, Order, OrderId, OrderStatus, PeriodTotals, Texture, TextureId, UserAgreement, UserId,
};
use chrono::{DateTime, Utc};

use crate::agreement_store::AgreementStore;
use crate::error::DbError;
use crate::memory::MemoryRepository;
use crate::order_store::{OrderStore, Visibility};
use crate::postgres::PostgresPool;
use crate::statistics::StatsWindow;
use crate::texture_store::TextureStore;

/// Source of truth for orders, textures and consent records.
#[derive(Clone)]
pub enum Repository {
    /// Live `PostgreSQL` tables.
    Postgres(PostgresPool),
    /// In-process tables.
    Memory(MemoryRepository),
}

impl Repository {
    /// Insert an order and return its id.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the insert fails.
    pub async fn insert_order(
        &self,
        order: &NewOrder,
        created_at: DateTime<Utc>,
    ) -> Result<OrderId, DbError> {
        match self {
            Self::Postgres(pg) => OrderStore::new(pg.pool()).insert(order, created_at).await,
            Self::Memory(mem) => mem.insert_order(order, created_at).await,
        }
    }

    /// Fetch one order.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the query fails.
    pub async fn find_order(
        &self,
        id: OrderId,
        visibility: Visibility,
    ) -> Result<Option<Order>, DbError> {
        match self {
            Self::Postgres(pg) => OrderStore::new(pg.pool()).find(id, visibility).await,
            Self::Memory(mem) => mem.find_order(id, visibility).await,
        }
    }

    /// List orders newest first, optionally for one user only.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the query fails.
    pub async fn list_orders(
        &self,
        user_id: Option<UserId>,
        visibility: Visibility,
    ) -> Result<Vec<Order>, DbError> {
        match self {
            Self::Postgres(pg) => OrderStore::new(pg.pool()).list(user_id, visibility).await,
            Self::Memory(mem) => mem.list_orders(user_id, visibility).await,
        }
    }

    /// Soft-delete a user's active orders. Returns rows affected.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the update fails.
    pub async fn soft_delete_user_orders(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        match self {
            Self::Postgres(pg) => {
                OrderStore::new(pg.pool())
                    .soft_delete_for_user(user_id, at)
                    .await
            }
            Self::Memory(mem) => mem.soft_delete_user_orders(user_id, at).await,
        }
    }

    /// Change an active order's status. Returns `false` if there is none.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the update fails.
    pub async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        match self {
            Self::Postgres(pg) => {
                OrderStore::new(pg.pool())
                    .update_status(id, status, at)
                    .await
            }
            Self::Memory(mem) => mem.update_order_status(id, status, at).await,
        }
    }

    /// Fetch a texture by id.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the query fails.
    pub async fn find_texture(&self, id: &TextureId) -> Result<Option<Texture>, DbError> {
        match self {
            Self::Postgres(pg) => TextureStore::new(pg.pool()).find_by_id(id).await,
            Self::Memory(mem) => mem.find_texture(id).await,
        }
    }

    /// Fetch a texture by display name.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the query fails.
    pub async fn find_texture_by_name(&self, name: &str) -> Result<Option<Texture>, DbError> {
        match self {
            Self::Postgres(pg) => TextureStore::new(pg.pool()).find_by_name(name).await,
            Self::Memory(mem) => mem.find_texture_by_name(name).await,
        }
    }

    /// List in-stock textures ordered by name.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the query fails.
    pub async fn list_available_textures(&self) -> Result<Vec<Texture>, DbError> {
        match self {
            Self::Postgres(pg) => TextureStore::new(pg.pool()).list_available().await,
            Self::Memory(mem) => mem.list_available_textures().await,
        }
    }

    /// Record a user's consent and phone number.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the upsert fails.
    pub async fn upsert_agreement(&self, user_id: UserId, phone: &str) -> Result<(), DbError> {
        match self {
            Self::Postgres(pg) => AgreementStore::new(pg.pool()).upsert(user_id, phone).await,
            Self::Memory(mem) => mem.upsert_agreement(user_id, phone).await,
        }
    }

    /// Fetch a user's consent record, if any.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the query fails.
    pub async fn find_agreement(&self, user_id: UserId) -> Result<Option<UserAgreement>, DbError> {
        match self {
            Self::Postgres(pg) => AgreementStore::new(pg.pool()).find(user_id).await,
            Self::Memory(mem) => mem.find_agreement(user_id).await,
        }
    }

    /// Count and revenue of active orders in `window`.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the query fails.
    pub async fn period_totals(&self, window: StatsWindow) -> Result<PeriodTotals, DbError> {
        match self {
            Self::Postgres(pg) => OrderStore::new(pg.pool()).period_totals(window).await,
            Self::Memory(mem) => mem.period_totals(window).await,
        }
    }

    /// Number of active orders per status.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the query fails.
    pub async fn status_counts(&self) -> Result<BTreeMap<OrderStatus, u64>, DbError> {
        match self {
            Self::Postgres(pg) => OrderStore::new(pg.pool()).status_counts().await,
            Self::Memory(mem) => mem.status_counts().await,
        }
    }

    /// Release backend resources.
    pub async fn close(&self) {
        match self {
            Self::Postgres(pg) => pg.close().await,
            Self::Memory(_) => {}
        }
    }
}

impl From<PostgresPool> for Repository {
    fn from(pool: PostgresPool) -> Self {
        Self::Postgres(pool)
    }
}

impl From<MemoryRepository> for Repository {
    fn from(repo: MemoryRepository) -> Self {
        Self::Memory(repo)
    }
}
