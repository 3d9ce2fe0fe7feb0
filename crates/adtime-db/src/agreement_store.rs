//! User consent records on the `users` table.

use adtime_types::{UserAgreement, UserId};
use sqlx::PgPool;

use crate::error::DbError;

/// Operations on the `users` table.
pub struct AgreementStore<'a> {
    pool: &'a PgPool,
}

impl<'a> AgreementStore<'a> {
    /// Create a new agreement store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record that the user agreed, together with their phone number.
    ///
    /// A second call for the same user overwrites the phone number.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn upsert(&self, user_id: UserId, phone: &str) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO users (user_id, agreed_to_tpa, phone_number)
              VALUES ($1, TRUE, $2)
              ON CONFLICT (user_id) DO UPDATE
              SET agreed_to_tpa = TRUE, phone_number = EXCLUDED.phone_number",
        )
        .bind(user_id.into_inner())
        .bind(phone)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Fetch the consent record of a user, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn find(&self, user_id: UserId) -> Result<Option<UserAgreement>, DbError> {
        let row: Option<(bool, Option<String>)> = sqlx::query_as(
            "SELECT agreed_to_tpa, phone_number FROM users WHERE user_id = $1",
        )
        .bind(user_id.into_inner())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(agreed, phone)| UserAgreement {
            agreed,
            phone: phone.unwrap_or_default(),
        }))
    }
}
