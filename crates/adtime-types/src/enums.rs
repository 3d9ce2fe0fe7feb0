//! Enumeration types for the order-taking service.
//!
//! Both enums are persisted or keyed as snake_case text. Parsing is the
//! validation step applied when text comes back from the store.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Order lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of an order, stored in the `orders.status` text column.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Submitted by the customer, not yet reviewed.
    #[default]
    New,
    /// Confirmed by a manager after contacting the customer.
    Confirmed,
    /// Being cut and finished in the workshop.
    InProduction,
    /// Handed to the carrier.
    Shipped,
    /// Delivered and paid.
    Completed,
    /// Cancelled by the customer or a manager.
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::New,
        Self::Confirmed,
        Self::InProduction,
        Self::Shipped,
        Self::Completed,
        Self::Cancelled,
    ];

    /// The text stored in the database for this status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Confirmed => "confirmed",
            Self::InProduction => "in_production",
            Self::Shipped => "shipped",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when status text read from the store is not a known status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0:?}")]
pub struct ParseStatusError(pub String);

impl FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Rate-limited actions
// ---------------------------------------------------------------------------

/// A user action subject to per-user rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAction {
    /// Any bot command.
    Command,
    /// Submitting a new order.
    NewOrder,
    /// Requesting a price calculation.
    PriceQuote,
    /// Sharing a phone number with the manager.
    ShareContact,
}

impl RateLimitAction {
    /// The key segment used for this action's counter.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::NewOrder => "new_order",
            Self::PriceQuote => "price_quote",
            Self::ShareContact => "share_contact",
        }
    }
}

impl core::fmt::Display for RateLimitAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
