//! Shared type definitions for the adtime order-taking service.
//!
//! This crate is the single source of truth for the entities persisted by
//! `adtime-db` and consumed by the bot's command handlers.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe wrappers for order, user and texture identifiers
//! - [`enums`] -- Closed enumerations (order lifecycle, rate-limited actions)
//! - [`structs`] -- Entity structs (orders, textures, agreements, statistics)

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{OrderStatus, ParseStatusError, RateLimitAction};
pub use ids::{OrderId, TextureId, UserId};
pub use structs::{
    CostBreakdown, NewOrder, Order, OrderStatistics, PeriodTotals, Texture, UserAgreement,
};
