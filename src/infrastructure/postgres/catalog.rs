use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{query_as, FromRow};
use uuid::Uuid;

use super::{non_negative, PgStore};
use crate::application::ports::{ProductCatalog, StoreError};
use crate::domain::aggregates::{Product, ProductStatus, Variant};

const GET_PRODUCT_SQL: &str = "SELECT id, name, price, quantity, status, created_at, updated_at FROM products WHERE id = $1";
const GET_VARIANTS_SQL: &str = "SELECT id, name, price, quantity FROM product_variants WHERE product_id = $1 ORDER BY name";

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    price: Decimal,
    quantity: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct VariantRow {
    id: Uuid,
    name: String,
    price: Option<Decimal>,
    quantity: i32,
}

impl TryFrom<VariantRow> for Variant {
    type Error = StoreError;

    fn try_from(row: VariantRow) -> Result<Self, Self::Error> {
        Ok(Variant { id: row.id, name: row.name, price: row.price, quantity: non_negative("product_variants.quantity", row.quantity)? })
    }
}

#[async_trait]
impl ProductCatalog for PgStore {
    async fn find_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let Some(row) = query_as::<_, ProductRow>(GET_PRODUCT_SQL).bind(id).fetch_optional(&self.pool).await? else {
            return Ok(None);
        };

        let variants = query_as::<_, VariantRow>(GET_VARIANTS_SQL)
            .bind(id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Variant::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let status = row.status.parse::<ProductStatus>().map_err(|e| StoreError::Corrupt(e.to_string()))?;

        Ok(Some(Product::restore(
            row.id,
            row.name,
            row.price,
            non_negative("products.quantity", row.quantity)?,
            status,
            variants,
            row.created_at,
            row.updated_at,
        )))
    }
}
