//! Stock reads and guarded decrements.
//!
//! The connection-level helpers are shared with the checkout transaction in
//! `orders`.

use async_trait::async_trait;
use sqlx::{query_scalar, PgConnection};

use super::{as_column, non_negative, PgStore};
use crate::application::ports::{ReserveError, StockLedger, StoreError};
use crate::domain::value_objects::StockKey;

const PRODUCT_QUANTITY_SQL: &str = "SELECT quantity FROM products WHERE id = $1";
const VARIANT_QUANTITY_SQL: &str = "SELECT quantity FROM product_variants WHERE id = $1";

const LOCK_PRODUCT_SQL: &str = "SELECT quantity FROM products WHERE id = $1 FOR UPDATE";
const LOCK_VARIANT_SQL: &str = "SELECT quantity FROM product_variants WHERE id = $1 FOR UPDATE";

const DECREMENT_PRODUCT_SQL: &str =
    "UPDATE products SET quantity = quantity - $2, updated_at = NOW() WHERE id = $1 AND quantity >= $2 RETURNING quantity";
const DECREMENT_VARIANT_SQL: &str =
    "UPDATE product_variants SET quantity = quantity - $2 WHERE id = $1 AND quantity >= $2 RETURNING quantity";

async fn quantity(conn: &mut PgConnection, key: StockKey, lock: bool) -> Result<Option<u32>, StoreError> {
    let (sql, id) = match (key, lock) {
        (StockKey::Product(id), false) => (PRODUCT_QUANTITY_SQL, id),
        (StockKey::Variant(id), false) => (VARIANT_QUANTITY_SQL, id),
        (StockKey::Product(id), true) => (LOCK_PRODUCT_SQL, id),
        (StockKey::Variant(id), true) => (LOCK_VARIANT_SQL, id),
    };
    query_scalar::<_, i32>(sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|q| non_negative("quantity", q))
        .transpose()
}

/// Current quantity, row-locked until the surrounding transaction ends.
pub(super) async fn lock(conn: &mut PgConnection, key: StockKey) -> Result<Option<u32>, StoreError> {
    quantity(conn, key, true).await
}

/// Decrement if at least `amount` is on hand. `None` when the guard did not match.
pub(super) async fn decrement(conn: &mut PgConnection, key: StockKey, amount: u32) -> Result<Option<u32>, StoreError> {
    let (sql, id) = match key {
        StockKey::Product(id) => (DECREMENT_PRODUCT_SQL, id),
        StockKey::Variant(id) => (DECREMENT_VARIANT_SQL, id),
    };
    query_scalar::<_, i32>(sql)
        .bind(id)
        .bind(as_column(amount)?)
        .fetch_optional(&mut *conn)
        .await?
        .map(|q| non_negative("quantity", q))
        .transpose()
}

#[async_trait]
impl StockLedger for PgStore {
    async fn on_hand(&self, key: StockKey) -> Result<Option<u32>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        quantity(&mut conn, key, false).await
    }

    async fn reserve(&self, key: StockKey, amount: u32) -> Result<u32, ReserveError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let outcome = match decrement(&mut tx, key, amount).await? {
            Some(remaining) => Ok(remaining),
            None => match quantity(&mut tx, key, false).await? {
                Some(available) => Err(ReserveError::InsufficientStock { key, available }),
                None => Err(ReserveError::UnknownKey(key)),
            },
        };

        tx.commit().await.map_err(StoreError::from)?;
        outcome
    }
}
