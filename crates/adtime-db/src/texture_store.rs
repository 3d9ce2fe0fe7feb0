//! Texture catalog reads on the `textures` table.
//!
//! The catalog is maintained outside this service; the bot only reads it.

use adtime_types::{Texture, TextureId};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::error::DbError;

/// Columns selected for every texture read, in [`TextureRow`] order.
const TEXTURE_COLUMNS: &str = "id, name, price_per_dm2, image_url, in_stock";

/// Read operations on the `textures` table.
pub struct TextureStore<'a> {
    pool: &'a PgPool,
}

impl<'a> TextureStore<'a> {
    /// Create a new texture store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a texture by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn find_by_id(&self, id: &TextureId) -> Result<Option<Texture>, DbError> {
        let sql = format!("SELECT {TEXTURE_COLUMNS} FROM textures WHERE id = $1");
        let row = sqlx::query_as::<_, TextureRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Texture::from))
    }

    /// Fetch a texture by its display name; the lowest id wins when names
    /// repeat.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Texture>, DbError> {
        let sql =
            format!("SELECT {TEXTURE_COLUMNS} FROM textures WHERE name = $1 ORDER BY id LIMIT 1");
        let row = sqlx::query_as::<_, TextureRow>(&sql)
            .bind(name)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Texture::from))
    }

    /// List in-stock textures ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn list_available(&self) -> Result<Vec<Texture>, DbError> {
        let sql = format!("SELECT {TEXTURE_COLUMNS} FROM textures WHERE in_stock ORDER BY name");
        let rows = sqlx::query_as::<_, TextureRow>(&sql)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Texture::from).collect())
    }
}

/// A row from the `textures` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TextureRow {
    /// Catalog identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Price per square decimeter.
    pub price_per_dm2: Decimal,
    /// Preview image.
    pub image_url: String,
    /// Availability flag.
    pub in_stock: bool,
}

impl From<TextureRow> for Texture {
    fn from(row: TextureRow) -> Self {
        Self {
            id: TextureId(row.id),
            name: row.name,
            price_per_dm2: row.price_per_dm2,
            image_url: row.image_url,
            in_stock: row.in_stock,
        }
    }
}
