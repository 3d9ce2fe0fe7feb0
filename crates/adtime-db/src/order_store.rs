//! Order persistence on the `orders` table.
//!
//! Orders are inserted once and never physically removed. Soft deletion
//! sets `deleted_at`; which rows a read sees is decided in one place,
//! [`Visibility`], so every query applies the same filter.
//!
//! Statistics queries live here too, since they aggregate over the same
//! rows and must honour the same visibility rule.

use std::collections::BTreeMap;

use adtime_types::{
    CostBreakdown, NewOrder, Order, OrderId, OrderStatus, PeriodTotals, TextureId, UserId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::error::DbError;
use crate::statistics::StatsWindow;

/// Columns selected for every order read, in [`OrderRow`] order.
const ORDER_COLUMNS: &str = "id, user_id, width_cm, height_cm, texture_id, texture_name, price, \
     leather_cost, process_cost, total_cost, commission, tax, net_revenue, profit, \
     contact, status, created_at, updated_at, deleted_at";

/// Which orders a read is allowed to see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    /// Only orders that have not been soft-deleted.
    #[default]
    Active,
    /// Every order, including soft-deleted ones.
    IncludeDeleted,
}

impl Visibility {
    /// SQL predicate over the `orders` table implementing this visibility.
    pub const fn sql_predicate(self) -> &'static str {
        match self {
            Self::Active => "deleted_at IS NULL",
            Self::IncludeDeleted => "TRUE",
        }
    }

    /// Whether `order` is visible.
    pub const fn admits(self, order: &Order) -> bool {
        match self {
            Self::Active => !order.is_deleted(),
            Self::IncludeDeleted => true,
        }
    }
}

/// Operations on the `orders` table.
pub struct OrderStore<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderStore<'a> {
    /// Create a new order store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new order and return its assigned id.
    ///
    /// `created_at` is also written as the initial `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn insert(
        &self,
        order: &NewOrder,
        created_at: DateTime<Utc>,
    ) -> Result<OrderId, DbError> {
        let row: (i64,) = sqlx::query_as(
            r"INSERT INTO orders (
                  user_id, width_cm, height_cm, texture_id, texture_name, price,
                  leather_cost, process_cost, total_cost, commission, tax,
                  net_revenue, profit, contact, status, created_at, updated_at
              ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
              RETURNING id",
        )
        .bind(order.user_id.into_inner())
        .bind(order.width_cm)
        .bind(order.height_cm)
        .bind(order.texture_id.as_str())
        .bind(&order.texture_name)
        .bind(order.price)
        .bind(order.costs.leather_cost)
        .bind(order.costs.process_cost)
        .bind(order.costs.total_cost)
        .bind(order.costs.commission)
        .bind(order.costs.tax)
        .bind(order.costs.net_revenue)
        .bind(order.costs.profit)
        .bind(&order.contact)
        .bind(order.status.as_str())
        .bind(created_at)
        .fetch_one(self.pool)
        .await?;

        tracing::debug!(order_id = row.0, user_id = %order.user_id, "Inserted order");
        Ok(OrderId(row.0))
    }

    /// Fetch one order by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    /// Returns [`DbError::InvalidStatus`] if the stored status is unknown.
    pub async fn find(
        &self,
        id: OrderId,
        visibility: Visibility,
    ) -> Result<Option<Order>, DbError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND {}",
            visibility.sql_predicate()
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id.into_inner())
            .fetch_optional(self.pool)
            .await?;

        row.map(Order::try_from).transpose()
    }

    /// List orders newest first, optionally restricted to one user.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    /// Returns [`DbError::InvalidStatus`] if any stored status is unknown.
    pub async fn list(
        &self,
        user_id: Option<UserId>,
        visibility: Visibility,
    ) -> Result<Vec<Order>, DbError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::BIGINT IS NULL OR user_id = $1) AND {} \
             ORDER BY created_at DESC, id DESC",
            visibility.sql_predicate()
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(user_id.map(UserId::into_inner))
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    /// Soft-delete every active order of a user. Returns rows affected.
    ///
    /// Already-deleted orders keep their original `deleted_at`, so repeating
    /// the call changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the update fails.
    pub async fn soft_delete_for_user(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let sql = format!(
            "UPDATE orders SET deleted_at = $2, updated_at = $2 WHERE user_id = $1 AND {}",
            Visibility::Active.sql_predicate()
        );
        let result = sqlx::query(&sql)
            .bind(user_id.into_inner())
            .bind(at)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Change the status of an active order. Returns `false` if no active
    /// order has that id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the update fails.
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let sql = format!(
            "UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1 AND {}",
            Visibility::Active.sql_predicate()
        );
        let result = sqlx::query(&sql)
            .bind(id.into_inner())
            .bind(status.as_str())
            .bind(at)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count and revenue of active orders created within `window`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn period_totals(&self, window: StatsWindow) -> Result<PeriodTotals, DbError> {
        let sql = format!(
            "SELECT COUNT(*), COALESCE(SUM(price), 0) FROM orders WHERE {} AND {}",
            Visibility::Active.sql_predicate(),
            window.sql_predicate()
        );
        let (orders, revenue): (i64, Decimal) =
            sqlx::query_as(&sql).fetch_one(self.pool).await?;

        Ok(PeriodTotals {
            orders: u64::try_from(orders).unwrap_or(0),
            revenue,
        })
    }

    /// Number of active orders per status.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    /// Returns [`DbError::InvalidStatus`] if any stored status is unknown.
    pub async fn status_counts(&self) -> Result<BTreeMap<OrderStatus, u64>, DbError> {
        let sql = format!(
            "SELECT status, COUNT(*) FROM orders WHERE {} GROUP BY status",
            Visibility::Active.sql_predicate()
        );
        let rows: Vec<(String, i64)> = sqlx::query_as(&sql).fetch_all(self.pool).await?;

        let mut counts = BTreeMap::new();
        for (status, count) in rows {
            counts.insert(status.parse()?, u64::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }
}

/// A row from the `orders` table.
///
/// Status is kept as text here and validated when converting to [`Order`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    /// Store-assigned id.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// Width in centimeters.
    pub width_cm: i32,
    /// Height in centimeters.
    pub height_cm: i32,
    /// Texture reference.
    pub texture_id: String,
    /// Denormalized texture name.
    pub texture_name: String,
    /// Final price.
    pub price: Decimal,
    /// Leather cost.
    pub leather_cost: Decimal,
    /// Processing cost.
    pub process_cost: Decimal,
    /// Leather plus processing.
    pub total_cost: Decimal,
    /// Commission.
    pub commission: Decimal,
    /// Tax.
    pub tax: Decimal,
    /// Net revenue.
    pub net_revenue: Decimal,
    /// Profit.
    pub profit: Decimal,
    /// Customer contact.
    pub contact: String,
    /// Status text.
    pub status: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-deletion timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DbError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderId(row.id),
            user_id: UserId(row.user_id),
            width_cm: row.width_cm,
            height_cm: row.height_cm,
            texture_id: TextureId(row.texture_id),
            texture_name: row.texture_name,
            price: row.price,
            costs: CostBreakdown {
                leather_cost: row.leather_cost,
                process_cost: row.process_cost,
                total_cost: row.total_cost,
                commission: row.commission,
                tax: row.tax,
                net_revenue: row.net_revenue,
                profit: row.profit,
            },
            contact: row.contact,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> OrderRow {
        let now = Utc::now();
        OrderRow {
            id: 5,
            user_id: 9,
            width_cm: 40,
            height_cm: 25,
            texture_id: String::from("croc-black"),
            texture_name: String::from("Croc black"),
            price: Decimal::new(9900, 0),
            leather_cost: Decimal::new(3000, 0),
            process_cost: Decimal::new(2000, 0),
            total_cost: Decimal::new(5000, 0),
            commission: Decimal::new(990, 0),
            tax: Decimal::new(594, 0),
            net_revenue: Decimal::new(8316, 0),
            profit: Decimal::new(3316, 0),
            contact: String::from("+70000000000"),
            status: status.to_owned(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn row_converts_with_known_status() {
        let order = Order::try_from(row("shipped")).ok();
        let order = order.as_ref();
        assert_eq!(order.map(|o| o.status), Some(OrderStatus::Shipped));
        assert_eq!(order.map(|o| o.costs.total_cost), Some(Decimal::new(5000, 0)));
    }

    #[test]
    fn row_with_unknown_status_is_rejected() {
        let result = Order::try_from(row("teleported"));
        assert!(matches!(result, Err(DbError::InvalidStatus(_))));
    }

    #[test]
    fn visibility_predicates_agree() {
        let mut order = Order::try_from(row("new")).ok();
        assert!(order.as_ref().is_some_and(|o| Visibility::Active.admits(o)));

        if let Some(o) = order.as_mut() {
            o.deleted_at = Some(Utc::now());
        }
        assert!(!order.as_ref().is_some_and(|o| Visibility::Active.admits(o)));
        assert!(order.as_ref().is_some_and(|o| Visibility::IncludeDeleted.admits(o)));
        assert_eq!(Visibility::Active.sql_predicate(), "deleted_at IS NULL");
    }
}
