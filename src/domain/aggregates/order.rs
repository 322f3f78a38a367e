//! Order Aggregate
//!
//! Orders are created once by checkout, always in `Pending`. Their lines are
//! snapshots taken at purchase time and never change afterwards; only the status
//! fields move, driven by administrators.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::services::pricing::{self, PriceBreakdown, PricedLine};
use crate::domain::value_objects::{Identity, OrderNumber, Quantity, StockKey};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: Uuid,
    order_number: OrderNumber,
    owner: Identity,
    status: OrderStatus,
    payment_status: PaymentStatus,
    fulfillment_status: FulfillmentStatus,
    currency: String,
    lines: Vec<OrderLine>,
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
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Snapshot of a purchased line, independent of the live product record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: Quantity,
    pub line_total: Decimal,
}

impl OrderLine {
    pub fn snapshot(product_id: Uuid, variant_id: Option<Uuid>, name: impl Into<String>, unit_price: Decimal, quantity: Quantity) -> Self {
        Self {
            id: Uuid::now_v7(), product_id, variant_id, name: name.into(), unit_price, quantity,
            line_total: unit_price * Decimal::from(quantity.value()),
        }
    }
    pub fn stock_key(&self) -> StockKey { StockKey::for_line(self.product_id, self.variant_id) }
}

impl PricedLine for OrderLine {
    fn unit_price(&self) -> Decimal { self.unit_price }
    fn quantity(&self) -> Quantity { self.quantity }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus { #[default] Pending, Confirmed, Processing, Shipped, Delivered, Cancelled, Refunded }

impl OrderStatus {
    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled | Self::Refunded) }

    /// Position on the fulfilment path; `None` for the side exits.
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Confirmed => Some(1),
            Self::Processing => Some(2),
            Self::Shipped => Some(3),
            Self::Delivered => Some(4),
            Self::Cancelled | Self::Refunded => None,
        }
    }

    /// Forward moves along the path, or a side exit from any non-terminal state.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() { return false; }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to > from,
            (None, Some(_)) => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING", Self::Confirmed => "CONFIRMED", Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED", Self::Delivered => "DELIVERED", Self::Cancelled => "CANCELLED", Self::Refunded => "REFUNDED",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending), "CONFIRMED" => Ok(Self::Confirmed), "PROCESSING" => Ok(Self::Processing),
            "SHIPPED" => Ok(Self::Shipped), "DELIVERED" => Ok(Self::Delivered), "CANCELLED" => Ok(Self::Cancelled),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(OrderError::UnknownValue(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed, Refunded }

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "PENDING", Self::Paid => "PAID", Self::Failed => "FAILED", Self::Refunded => "REFUNDED" }
    }
}

impl FromStr for PaymentStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending), "PAID" => Ok(Self::Paid), "FAILED" => Ok(Self::Failed), "REFUNDED" => Ok(Self::Refunded),
            other => Err(OrderError::UnknownValue(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentStatus { #[default] Unfulfilled, Partial, Fulfilled }

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Unfulfilled => "UNFULFILLED", Self::Partial => "PARTIAL", Self::Fulfilled => "FULFILLED" }
    }
}

impl FromStr for FulfillmentStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNFULFILLED" => Ok(Self::Unfulfilled), "PARTIAL" => Ok(Self::Partial), "FULFILLED" => Ok(Self::Fulfilled),
            other => Err(OrderError::UnknownValue(other.to_string())),
        }
    }
}

/// Everything checkout knows when it places an order.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub owner: Identity,
    pub currency: String,
    pub lines: Vec<OrderLine>,
    pub pricing: PriceBreakdown,
    pub shipping_address_id: Uuid,
    pub billing_address_id: Uuid,
    pub coupon_id: Option<Uuid>,
    pub payment_method: String,
    pub payment_intent_id: Option<String>,
}

/// Persisted shape of an order, used to rebuild the aggregate from storage.
#[derive(Clone, Debug)]
pub struct OrderRecord {
    pub id: Uuid,
    pub order_number: OrderNumber,
    pub owner: Identity,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub currency: String,
    pub lines: Vec<OrderLine>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub shipping_address_id: Uuid,
    pub billing_address_id: Uuid,
    pub coupon_id: Option<Uuid>,
    pub payment_method: String,
    pub payment_intent_id: Option<String>,
    pub tracking_number: Option<String>,
    pub shipping_carrier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Creates a `Pending` order. The subtotal is taken from the snapshot lines so
    /// the stored total always recomputes from them.
    pub fn place(new: NewOrder, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if new.lines.is_empty() { return Err(OrderError::NoItems); }
        let subtotal = pricing::subtotal(&new.lines);
        if subtotal != new.pricing.subtotal { return Err(OrderError::SubtotalMismatch); }
        let PriceBreakdown { discount, shipping, tax, .. } = new.pricing;
        if discount < Decimal::ZERO || shipping < Decimal::ZERO || tax < Decimal::ZERO || discount > subtotal {
            return Err(OrderError::NegativeAmount);
        }
        let id = Uuid::now_v7();
        let total = subtotal - discount + shipping + tax;
        let mut order = Self {
            id, order_number: new.order_number, owner: new.owner, status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending, fulfillment_status: FulfillmentStatus::Unfulfilled,
            currency: new.currency, lines: new.lines, subtotal, discount, shipping, tax, total,
            shipping_address_id: new.shipping_address_id, billing_address_id: new.billing_address_id,
            coupon_id: new.coupon_id, payment_method: new.payment_method, payment_intent_id: new.payment_intent_id,
            tracking_number: None, shipping_carrier: None, created_at: now, updated_at: now,
            shipped_at: None, delivered_at: None, cancelled_at: None, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: id,
            order_number: order.order_number.to_string(),
            owner: order.owner.to_string(),
            total,
            currency: order.currency.clone(),
        }));
        Ok(order)
    }

    pub fn rehydrate(r: OrderRecord) -> Self {
        Self {
            id: r.id, order_number: r.order_number, owner: r.owner, status: r.status, payment_status: r.payment_status,
            fulfillment_status: r.fulfillment_status, currency: r.currency, lines: r.lines, subtotal: r.subtotal,
            discount: r.discount, shipping: r.shipping, tax: r.tax, total: r.total,
            shipping_address_id: r.shipping_address_id, billing_address_id: r.billing_address_id, coupon_id: r.coupon_id,
            payment_method: r.payment_method, payment_intent_id: r.payment_intent_id, tracking_number: r.tracking_number,
            shipping_carrier: r.shipping_carrier, created_at: r.created_at, updated_at: r.updated_at,
            shipped_at: r.shipped_at, delivered_at: r.delivered_at, cancelled_at: r.cancelled_at, events: vec![],
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &OrderNumber { &self.order_number }
    pub fn owner(&self) -> &Identity { &self.owner }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn fulfillment_status(&self) -> FulfillmentStatus { self.fulfillment_status }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn lines(&self) -> &[OrderLine] { &self.lines }
    pub fn subtotal(&self) -> Decimal { self.subtotal }
    pub fn discount(&self) -> Decimal { self.discount }
    pub fn shipping(&self) -> Decimal { self.shipping }
    pub fn tax(&self) -> Decimal { self.tax }
    pub fn total(&self) -> Decimal { self.total }
    pub fn shipping_address_id(&self) -> Uuid { self.shipping_address_id }
    pub fn billing_address_id(&self) -> Uuid { self.billing_address_id }
    pub fn coupon_id(&self) -> Option<Uuid> { self.coupon_id }
    pub fn payment_method(&self) -> &str { &self.payment_method }
    pub fn payment_intent_id(&self) -> Option<&str> { self.payment_intent_id.as_deref() }
    pub fn tracking_number(&self) -> Option<&str> { self.tracking_number.as_deref() }
    pub fn shipping_carrier(&self) -> Option<&str> { self.shipping_carrier.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn shipped_at(&self) -> Option<DateTime<Utc>> { self.shipped_at }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }
    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> { self.cancelled_at }

    /// `total` recomputed from the snapshot lines.
    pub fn recomputed_total(&self) -> Decimal { pricing::subtotal(&self.lines) - self.discount + self.shipping + self.tax }

    pub fn transition_to(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }
        let from = self.status;
        self.status = next;
        match next {
            OrderStatus::Shipped => { self.shipped_at.get_or_insert(now); }
            OrderStatus::Delivered => { self.delivered_at.get_or_insert(now); }
            OrderStatus::Cancelled => { self.cancelled_at.get_or_insert(now); }
            _ => {}
        }
        self.updated_at = now;
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to: next }));
        Ok(())
    }

    /// Attach the processor's payment handle before the order is committed.
    pub fn attach_payment_intent(&mut self, payment_intent_id: impl Into<String>) {
        self.payment_intent_id = Some(payment_intent_id.into());
    }

    /// Replace a colliding order number before the order is committed.
    pub fn reassign_number(&mut self, number: OrderNumber) {
        for event in &mut self.events {
            if let DomainEvent::Order(OrderEvent::Placed { order_number, .. }) = event {
                *order_number = number.to_string();
            }
        }
        self.order_number = number;
    }

    pub fn set_payment_status(&mut self, status: PaymentStatus, now: DateTime<Utc>) { self.payment_status = status; self.updated_at = now; }
    pub fn set_fulfillment_status(&mut self, status: FulfillmentStatus, now: DateTime<Utc>) { self.fulfillment_status = status; self.updated_at = now; }

    pub fn set_tracking(&mut self, tracking_number: Option<String>, carrier: Option<String>, now: DateTime<Utc>) {
        if tracking_number.is_some() { self.tracking_number = tracking_number; }
        if carrier.is_some() { self.shipping_carrier = carrier; }
        self.updated_at = now;
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("priced subtotal does not match the order lines")]
    SubtotalMismatch,
    #[error("order amounts must be non-negative")]
    NegativeAmount,
    #[error("cannot move order from {from:?} to {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("unknown status value {0}")]
    UnknownValue(String),
}
