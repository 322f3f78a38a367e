//! Ports the use cases depend on. Adapters live in `crate::infrastructure`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    aggregates::{Cart, Coupon, Order, Product},
    events::DomainEvent,
    value_objects::{CouponCode, Identity, StockKey},
};

/// Storage failures. Constraint violations are classified so callers can tell a
/// conflicting write from an outage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("conflicting write")]
    Conflict,

    #[error("related record not found")]
    InvalidReference,

    #[error("stored data is invalid: {0}")]
    Corrupt(String),

    #[error("storage error")]
    Sql(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        use sqlx::error::{DatabaseError, ErrorKind};

        if matches!(error, sqlx::Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::UniqueViolation) => Self::Conflict,
            Some(ErrorKind::ForeignKeyViolation) => Self::InvalidReference,
            Some(ErrorKind::Other | _) | None => Self::Sql(error),
        }
    }
}

#[automock]
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find_product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;
}

#[automock]
#[async_trait]
pub trait CartStore: Send + Sync {
    /// The cart owned by `owner`, with every line and its live product name.
    async fn find_cart(&self, owner: &Identity) -> Result<Option<Cart>, StoreError>;

    /// Persist the cart and make its stored lines match `cart.lines()` exactly.
    async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError>;
}

#[automock]
#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, StoreError>;

    /// Number of orders that reference the coupon.
    async fn count_orders_using(&self, coupon_id: Uuid) -> Result<u64, StoreError>;
}

#[derive(Debug, Error)]
pub enum ReserveError {
    #[error("insufficient stock for {key}: {available} available")]
    InsufficientStock { key: StockKey, available: u32 },

    #[error("unknown stock location {0}")]
    UnknownKey(StockKey),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Authoritative on-hand quantities.
#[automock]
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Current quantity, or `None` when nothing is stored under `key`.
    async fn on_hand(&self, key: StockKey) -> Result<Option<u32>, StoreError>;

    /// Check-then-decrement as one atomic step. Returns the quantity left.
    async fn reserve(&self, key: StockKey, quantity: u32) -> Result<u32, ReserveError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StockDecrement {
    pub key: StockKey,
    pub quantity: u32,
    pub remaining: u32,
}

#[derive(Debug)]
pub struct PlacedOrder {
    pub order: Order,
    pub decrements: Vec<StockDecrement>,
}

#[derive(Debug, Error)]
pub enum CommitError {
    /// Stock re-validated inside the atomic unit fell short.
    #[error("insufficient stock for {item}")]
    InsufficientStock { item: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[automock]
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// The checkout atomic unit: re-validate and decrement stock for every line,
    /// insert the order and its lines, and delete every line of `cart_id`. Either
    /// all of it happens or none of it does.
    ///
    /// The order number is regenerated if it collides with an existing order.
    async fn place_order(&self, cart_id: Uuid, order: Order) -> Result<PlacedOrder, CommitError>;

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Persist the mutable status fields of an existing order.
    async fn save_status(&self, order: &Order) -> Result<(), StoreError>;

    async fn exists_for_payment_intent(&self, payment_intent_id: &str) -> Result<bool, StoreError>;
}

/// Request for an authorization hold with the payment processor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub amount_minor_units: i64,
    pub currency: String,
    pub metadata: BTreeMap<String, String>,
}

/// What the client needs to confirm the payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHandle {
    pub id: String,
    pub client_secret: String,
}

/// An authorization the processor still considers unconfirmed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAuthorization {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment gateway is not configured")]
    NotConfigured,

    #[error("payment gateway timed out")]
    TimedOut,

    #[error("amount cannot be expressed in minor units")]
    InvalidAmount,

    #[error("payment gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("payment gateway unavailable")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[automock]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn authorize(&self, request: AuthorizationRequest) -> Result<PaymentHandle, PaymentError>;

    /// Authorizations created before `created_before` that were never confirmed.
    async fn list_unconfirmed(&self, created_before: DateTime<Utc>) -> Result<Vec<PendingAuthorization>, PaymentError>;

    async fn cancel(&self, payment_intent_id: &str) -> Result<(), PaymentError>;
}

#[derive(Debug, Error)]
#[error("failed to publish {subject}")]
pub struct PublishError {
    pub subject: &'static str,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

#[automock]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError>;
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("setting {0} could not be decrypted")]
    Decrypt(String),

    #[error("settings storage error")]
    Store(#[from] StoreError),
}

/// Dynamic store settings, injected rather than read from global state.
#[automock]
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn get_string(&self, key: &str, default: &str) -> String;

    /// Decrypted value of a secret setting, `None` when it is not set anywhere.
    async fn get_secret(&self, key: &str) -> Result<Option<String>, SettingsError>;

    async fn is_feature_enabled(&self, key: &str) -> bool {
        self.get_string(key, "false").await == "true"
    }
}
