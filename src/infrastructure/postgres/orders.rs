//! Orders, including the checkout transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{query, query_as, query_scalar, FromRow};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{as_column, non_negative, stock, PgStore};
use crate::application::ports::{CommitError, OrderStore, PlacedOrder, StockDecrement, StoreError};
use crate::domain::aggregates::{Order, OrderLine, OrderRecord};
use crate::domain::value_objects::{Identity, OrderNumber, Quantity, StockKey};

/// Fresh order numbers tried before giving up on a collision streak.
const MAX_NUMBER_ATTEMPTS: usize = 5;

const INSERT_ORDER_SQL: &str = "INSERT INTO orders (id, order_number, user_id, session_id, status, payment_status, \
     fulfillment_status, currency, subtotal, discount, shipping, tax, total, shipping_address_id, billing_address_id, \
     coupon_id, payment_method, payment_intent_id, created_at, updated_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20) \
     ON CONFLICT (order_number) DO NOTHING";

const INSERT_LINE_SQL: &str = "INSERT INTO order_items (id, order_id, product_id, variant_id, name, unit_price, quantity, line_total) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

const CLEAR_CART_SQL: &str = "DELETE FROM cart_items WHERE cart_id = $1";
const TOUCH_CART_SQL: &str = "UPDATE carts SET updated_at = NOW() WHERE id = $1";

const GET_ORDER_SQL: &str = "SELECT * FROM orders WHERE id = $1";
const GET_LINES_SQL: &str = "SELECT id, product_id, variant_id, name, unit_price, quantity, line_total \
     FROM order_items WHERE order_id = $1 ORDER BY id";

const UPDATE_STATUS_SQL: &str = "UPDATE orders SET status = $2, payment_status = $3, fulfillment_status = $4, \
     tracking_number = $5, shipping_carrier = $6, shipped_at = $7, delivered_at = $8, cancelled_at = $9, updated_at = $10 \
     WHERE id = $1";

const EXISTS_FOR_INTENT_SQL: &str = "SELECT EXISTS (SELECT 1 FROM orders WHERE payment_intent_id = $1)";

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Option<String>,
    session_id: Option<String>,
    status: String,
    payment_status: String,
    fulfillment_status: String,
    currency: String,
    subtotal: Decimal,
    discount: Decimal,
    shipping: Decimal,
    tax: Decimal,
    total: Decimal,
    shipping_address_id: Uuid,
    billing_address_id: Uuid,
    coupon_id: Option<Uuid>,
    payment_method: String,
    payment_intent_id: Option<String>,
    tracking_number: Option<String>,
    shipping_carrier: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct OrderLineRow {
    id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    name: String,
    unit_price: Decimal,
    quantity: i32,
    line_total: Decimal,
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = StoreError;

    fn try_from(row: OrderLineRow) -> Result<Self, Self::Error> {
        let quantity = Quantity::new(non_negative("order_items.quantity", row.quantity)?).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(OrderLine {
            id: row.id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            name: row.name,
            unit_price: row.unit_price,
            quantity,
            line_total: row.line_total,
        })
    }
}

fn owner_of(row: &OrderRow) -> Result<Identity, StoreError> {
    match (&row.user_id, &row.session_id) {
        (Some(account), _) => Ok(Identity::Account(account.clone())),
        (None, Some(session)) => Ok(Identity::Session(session.clone())),
        (None, None) => Err(StoreError::Corrupt(format!("order {} has no owner", row.id))),
    }
}

fn corrupt(e: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(e.to_string())
}

impl OrderRow {
    fn into_order(self, lines: Vec<OrderLine>) -> Result<Order, StoreError> {
        let owner = owner_of(&self)?;
        Ok(Order::rehydrate(OrderRecord {
            id: self.id,
            order_number: OrderNumber::from_stored(self.order_number),
            owner,
            status: self.status.parse().map_err(corrupt)?,
            payment_status: self.payment_status.parse().map_err(corrupt)?,
            fulfillment_status: self.fulfillment_status.parse().map_err(corrupt)?,
            currency: self.currency,
            lines,
            subtotal: self.subtotal,
            discount: self.discount,
            shipping: self.shipping,
            tax: self.tax,
            total: self.total,
            shipping_address_id: self.shipping_address_id,
            billing_address_id: self.billing_address_id,
            coupon_id: self.coupon_id,
            payment_method: self.payment_method,
            payment_intent_id: self.payment_intent_id,
            tracking_number: self.tracking_number,
            shipping_carrier: self.shipping_carrier,
            created_at: self.created_at,
            updated_at: self.updated_at,
            shipped_at: self.shipped_at,
            delivered_at: self.delivered_at,
            cancelled_at: self.cancelled_at,
        }))
    }
}

fn line_name(order: &Order, key: StockKey) -> String {
    order.lines().iter().find(|l| l.stock_key() == key).map_or_else(|| key.to_string(), |l| l.name.clone())
}

#[async_trait]
impl OrderStore for PgStore {
    async fn place_order(&self, cart_id: Uuid, mut order: Order) -> Result<PlacedOrder, CommitError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let mut requested: BTreeMap<StockKey, u32> = BTreeMap::new();
        for line in order.lines() {
            *requested.entry(line.stock_key()).or_default() += line.quantity.value();
        }

        // Lock in key order so concurrent checkouts cannot deadlock, and
        // re-validate: the early stock check ran outside this transaction.
        for (&key, &quantity) in &requested {
            let available = stock::lock(&mut tx, key).await?.unwrap_or(0);
            if available < quantity {
                debug!(%key, quantity, available, "stock fell short inside the checkout transaction");
                return Err(CommitError::InsufficientStock { item: line_name(&order, key) });
            }
        }

        let mut attempts = 0;
        loop {
            let inserted = query(INSERT_ORDER_SQL)
                .bind(order.id())
                .bind(order.order_number().as_str())
                .bind(order.owner().account_id())
                .bind(order.owner().session_token())
                .bind(order.status().as_str())
                .bind(order.payment_status().as_str())
                .bind(order.fulfillment_status().as_str())
                .bind(order.currency())
                .bind(order.subtotal())
                .bind(order.discount())
                .bind(order.shipping())
                .bind(order.tax())
                .bind(order.total())
                .bind(order.shipping_address_id())
                .bind(order.billing_address_id())
                .bind(order.coupon_id())
                .bind(order.payment_method())
                .bind(order.payment_intent_id())
                .bind(order.created_at())
                .bind(order.updated_at())
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from)?
                .rows_affected();

            if inserted == 1 {
                break;
            }

            attempts += 1;
            warn!(order_number = %order.order_number(), attempts, "order number collision");
            if attempts >= MAX_NUMBER_ATTEMPTS {
                return Err(StoreError::Conflict.into());
            }
            order.reassign_number(OrderNumber::generate(Utc::now()));
        }

        for line in order.lines() {
            query(INSERT_LINE_SQL)
                .bind(line.id)
                .bind(order.id())
                .bind(line.product_id)
                .bind(line.variant_id)
                .bind(&line.name)
                .bind(line.unit_price)
                .bind(as_column(line.quantity.value())?)
                .bind(line.line_total)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from)?;
        }

        let mut decrements = Vec::with_capacity(requested.len());
        for (key, quantity) in requested {
            let remaining = stock::decrement(&mut tx, key, quantity)
                .await?
                .ok_or_else(|| CommitError::InsufficientStock { item: line_name(&order, key) })?;
            decrements.push(StockDecrement { key, quantity, remaining });
        }

        query(CLEAR_CART_SQL).bind(cart_id).execute(&mut *tx).await.map_err(StoreError::from)?;
        query(TOUCH_CART_SQL).bind(cart_id).execute(&mut *tx).await.map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;

        Ok(PlacedOrder { order, decrements })
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let Some(row) = query_as::<_, OrderRow>(GET_ORDER_SQL).bind(id).fetch_optional(&self.pool).await? else {
            return Ok(None);
        };

        let lines = query_as::<_, OrderLineRow>(GET_LINES_SQL)
            .bind(id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(OrderLine::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        row.into_order(lines).map(Some)
    }

    async fn save_status(&self, order: &Order) -> Result<(), StoreError> {
        let result = query(UPDATE_STATUS_SQL)
            .bind(order.id())
            .bind(order.status().as_str())
            .bind(order.payment_status().as_str())
            .bind(order.fulfillment_status().as_str())
            .bind(order.tracking_number())
            .bind(order.shipping_carrier())
            .bind(order.shipped_at())
            .bind(order.delivered_at())
            .bind(order.cancelled_at())
            .bind(order.updated_at())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn exists_for_payment_intent(&self, payment_intent_id: &str) -> Result<bool, StoreError> {
        Ok(query_scalar::<_, bool>(EXISTS_FOR_INTENT_SQL).bind(payment_intent_id).fetch_one(&self.pool).await?)
    }
}
