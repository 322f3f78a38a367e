use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{query, query_as, FromRow};
use uuid::Uuid;

use super::{as_column, non_negative, PgStore};
use crate::application::ports::{CartStore, StoreError};
use crate::domain::aggregates::{Cart, CartLine};
use crate::domain::value_objects::{Identity, Quantity};

const FIND_CART_SQL: &str = "SELECT id, created_at, updated_at FROM carts \
     WHERE user_id IS NOT DISTINCT FROM $1 AND session_id IS NOT DISTINCT FROM $2";

const CART_LINES_SQL: &str = "SELECT ci.id, ci.product_id, ci.variant_id, p.name AS product_name, ci.quantity, ci.price \
     FROM cart_items ci JOIN products p ON p.id = ci.product_id \
     WHERE ci.cart_id = $1 ORDER BY ci.created_at, ci.id";

const UPSERT_CART_SQL: &str = "INSERT INTO carts (id, user_id, session_id, created_at, updated_at) VALUES ($1, $2, $3, $4, $5) \
     ON CONFLICT (id) DO UPDATE SET updated_at = EXCLUDED.updated_at";

const DELETE_STALE_LINES_SQL: &str = "DELETE FROM cart_items WHERE cart_id = $1 AND NOT (id = ANY($2))";

const UPSERT_LINE_SQL: &str = "INSERT INTO cart_items (id, cart_id, product_id, variant_id, quantity, price) \
     VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (id) DO UPDATE SET quantity = EXCLUDED.quantity";

#[derive(Debug, FromRow)]
struct CartRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct CartLineRow {
    id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    product_name: String,
    quantity: i32,
    price: Decimal,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = StoreError;

    fn try_from(row: CartLineRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::new(non_negative("cart_items.quantity", row.quantity)?).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(CartLine {
            id: row.id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            product_name: row.product_name,
            quantity,
            unit_price: row.price,
        })
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn find_cart(&self, owner: &Identity) -> Result<Option<Cart>, StoreError> {
        let Some(row) = query_as::<_, CartRow>(FIND_CART_SQL)
            .bind(owner.account_id())
            .bind(owner.session_token())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let lines = query_as::<_, CartLineRow>(CART_LINES_SQL)
            .bind(row.id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(CartLine::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Cart::restore(row.id, owner.clone(), lines, row.created_at, row.updated_at)))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        query(UPSERT_CART_SQL)
            .bind(cart.id())
            .bind(cart.owner().account_id())
            .bind(cart.owner().session_token())
            .bind(cart.created_at())
            .bind(cart.updated_at())
            .execute(&mut *tx)
            .await?;

        let kept: Vec<Uuid> = cart.lines().iter().map(|l| l.id).collect();
        query(DELETE_STALE_LINES_SQL).bind(cart.id()).bind(&kept).execute(&mut *tx).await?;

        for line in cart.lines() {
            query(UPSERT_LINE_SQL)
                .bind(line.id)
                .bind(cart.id())
                .bind(line.product_id)
                .bind(line.variant_id)
                .bind(as_column(line.quantity.value())?)
                .bind(line.unit_price)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(())
    }
}
