//! Value Objects for the storefront

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Coupon code value object. Codes are compared case-insensitively, so they are
/// stored trimmed and upper-cased.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CouponCode(String);

impl CouponCode {
    pub const MAX_LEN: usize = 64;

    pub fn new(value: impl Into<String>) -> Result<Self, CouponCodeError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(CouponCodeError::Empty); }
        if value.len() > Self::MAX_LEN { return Err(CouponCodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponCodeError {
    #[error("coupon code is empty")]
    Empty,
    #[error("coupon code is too long")]
    TooLong,
}

/// Quantity of a line item. Always at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: Quantity) -> Self { Self(self.0.saturating_add(other.0)) }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self { q.0 }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity must be at least 1")]
    Zero,
}

/// Who owns a cart or an order: a signed-in account or an anonymous session token.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Identity {
    Account(String),
    Session(String),
}

impl Identity {
    pub fn account_id(&self) -> Option<&str> {
        match self { Self::Account(id) => Some(id), Self::Session(_) => None }
    }
    pub fn session_token(&self) -> Option<&str> {
        match self { Self::Session(token) => Some(token), Self::Account(_) => None }
    }
    /// Opaque value forwarded to the payment processor as metadata.
    pub fn as_str(&self) -> &str {
        match self { Self::Account(v) | Self::Session(v) => v }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account(id) => write!(f, "account:{id}"),
            Self::Session(token) => write!(f, "session:{token}"),
        }
    }
}

/// Where purchasable quantity lives for a line: on the product itself, or, when a
/// variant was selected, exclusively on that variant.
///
/// The derived ordering (products first, then variants, each by id) is the lock
/// order used by the checkout transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum StockKey {
    Product(Uuid),
    Variant(Uuid),
}

impl StockKey {
    pub fn for_line(product_id: Uuid, variant_id: Option<Uuid>) -> Self {
        variant_id.map_or(Self::Product(product_id), Self::Variant)
    }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product(id) => write!(f, "product:{id}"),
            Self::Variant(id) => write!(f, "variant:{id}"),
        }
    }
}

/// User-facing order identifier, `ORD-<unix millis>-<random suffix>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderNumber(String);

impl OrderNumber {
    const SUFFIX_LEN: usize = 6;

    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(Self::SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_uppercase())
            .collect();
        Self(format!("ORD-{}-{}", now.timestamp_millis(), suffix))
    }
    pub fn from_stored(value: String) -> Self { Self(value) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coupon_code_normalized() {
        let code = CouponCode::new("  save10 ").unwrap();
        assert_eq!(code.as_str(), "SAVE10");
        assert_eq!(CouponCode::new("   "), Err(CouponCodeError::Empty));
        assert_eq!(CouponCode::new("x".repeat(65)), Err(CouponCodeError::TooLong));
    }

    #[test]
    fn test_quantity_rejects_zero() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        assert_eq!(Quantity::new(2).unwrap().add(Quantity::new(3).unwrap()).value(), 5);
        assert!(serde_json::from_str::<Quantity>("0").is_err());
    }

    #[test]
    fn test_stock_key_prefers_variant() {
        let product = Uuid::now_v7();
        let variant = Uuid::now_v7();
        assert_eq!(StockKey::for_line(product, None), StockKey::Product(product));
        assert_eq!(StockKey::for_line(product, Some(variant)), StockKey::Variant(variant));
        assert!(StockKey::Product(variant) < StockKey::Variant(product));
    }

    #[test]
    fn test_order_number_format() {
        let now = Utc::now();
        let a = OrderNumber::generate(now);
        let b = OrderNumber::generate(now);
        assert!(a.as_str().starts_with(&format!("ORD-{}-", now.timestamp_millis())));
        assert_eq!(a.as_str().len(), "ORD-".len() + now.timestamp_millis().to_string().len() + 7);
        assert_ne!(a, b);
    }
}
