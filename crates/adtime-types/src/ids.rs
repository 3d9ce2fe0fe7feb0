//! Type-safe identifier wrappers.
//!
//! Orders and users are keyed by 64-bit integers (orders by a `BIGSERIAL`,
//! users by their chat id); textures by an opaque catalog string. Wrapping
//! them prevents passing a chat id where an order id is expected.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around an `i64` with standard derives.
macro_rules! define_int_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Return the inner `i64` value.
            pub const fn into_inner(self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_int_id! {
    /// Identifier of an order, assigned by the relational store on insert.
    OrderId
}

define_int_id! {
    /// Identifier of a bot user (the chat id the bot talks to).
    UserId
}

/// Identifier of a texture (leather material) in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextureId(pub String);

impl TextureId {
    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TextureId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TextureId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for TextureId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
