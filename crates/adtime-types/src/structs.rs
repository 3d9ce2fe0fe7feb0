//! Entity structs persisted by the storage layer.
//!
//! Monetary amounts are [`Decimal`] (stored as `NUMERIC`), timestamps are
//! UTC. Every value handed to a caller is an owned copy.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::enums::OrderStatus;
use crate::ids::{OrderId, TextureId, UserId};

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Cost breakdown computed by the pricing flow before an order is saved.
///
/// `total_cost` is expected to equal `leather_cost + process_cost`; the
/// store does not enforce it. All amounts are non-negative except `profit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Cost of the leather for the ordered area.
    pub leather_cost: Decimal,
    /// Cutting and finishing cost.
    pub process_cost: Decimal,
    /// Material plus processing.
    pub total_cost: Decimal,
    /// Marketplace / agent commission.
    pub commission: Decimal,
    /// Tax due on the sale.
    pub tax: Decimal,
    /// Revenue after commission and tax.
    pub net_revenue: Decimal,
    /// Net revenue minus total cost. May be negative.
    pub profit: Decimal,
}

/// The caller-supplied part of an order, before the store assigns an id
/// and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    /// The user placing the order.
    pub user_id: UserId,
    /// Width in centimeters.
    pub width_cm: i32,
    /// Height in centimeters.
    pub height_cm: i32,
    /// The chosen material.
    pub texture_id: TextureId,
    /// Material display name at the time of ordering.
    pub texture_name: String,
    /// Final price quoted to the customer.
    pub price: Decimal,
    /// Internal cost breakdown.
    pub costs: CostBreakdown,
    /// How to reach the customer (phone or username).
    pub contact: String,
    /// Initial lifecycle status, normally [`OrderStatus::New`].
    pub status: OrderStatus,
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Store-assigned identifier.
    pub id: OrderId,
    /// The user who placed the order.
    pub user_id: UserId,
    /// Width in centimeters.
    pub width_cm: i32,
    /// Height in centimeters.
    pub height_cm: i32,
    /// The chosen material.
    pub texture_id: TextureId,
    /// Material display name at the time of ordering.
    pub texture_name: String,
    /// Final price quoted to the customer.
    pub price: Decimal,
    /// Internal cost breakdown.
    pub costs: CostBreakdown,
    /// How to reach the customer.
    pub contact: String,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// When the order was saved.
    pub created_at: DateTime<Utc>,
    /// When the order was last modified.
    pub updated_at: DateTime<Utc>,
    /// When the order was soft-deleted, if it was.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Build the persisted form of `new` as the store would.
    pub fn from_new(id: OrderId, new: NewOrder, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: new.user_id,
            width_cm: new.width_cm,
            height_cm: new.height_cm,
            texture_id: new.texture_id,
            texture_name: new.texture_name,
            price: new.price,
            costs: new.costs,
            contact: new.contact,
            status: new.status,
            created_at,
            updated_at: created_at,
            deleted_at: None,
        }
    }

    /// Whether the order has been soft-deleted.
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A leather texture offered in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Texture {
    /// Catalog identifier.
    pub id: TextureId,
    /// Display name.
    pub name: String,
    /// Price per square decimeter. Must be strictly positive.
    pub price_per_dm2: Decimal,
    /// Preview image shown to the user.
    pub image_url: String,
    /// Whether the texture can currently be ordered.
    pub in_stock: bool,
}

impl Texture {
    /// Whether the texture carries a usable price.
    pub fn has_valid_price(&self) -> bool {
        self.price_per_dm2 > Decimal::ZERO
    }
}

// ---------------------------------------------------------------------------
// Consent
// ---------------------------------------------------------------------------

/// A user's consent to personal data processing.
///
/// The default value (not agreed, no phone) stands in for users who never
/// answered the consent prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgreement {
    /// Whether the user agreed.
    pub agreed: bool,
    /// Phone number shared together with the consent.
    pub phone: String,
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Order count and revenue over one reporting period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodTotals {
    /// Number of orders created in the period.
    pub orders: u64,
    /// Sum of order prices in the period.
    pub revenue: Decimal,
}

/// Aggregated order statistics for the manager dashboard.
///
/// Derived from order rows, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatistics {
    /// All orders.
    pub total: PeriodTotals,
    /// Orders created since midnight.
    pub today: PeriodTotals,
    /// Orders created in the trailing 7 days.
    pub week: PeriodTotals,
    /// Orders created in the trailing 30 days.
    pub month: PeriodTotals,
    /// Number of orders per lifecycle status.
    pub status_counts: BTreeMap<OrderStatus, u64>,
}
