//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::CouponCode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountKind { Percentage, Fixed, FreeShipping }

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Percentage => "PERCENTAGE", Self::Fixed => "FIXED", Self::FreeShipping => "FREE_SHIPPING" }
    }
}

impl FromStr for DiscountKind {
    type Err = CouponDataError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERCENTAGE" => Ok(Self::Percentage),
            "FIXED" => Ok(Self::Fixed),
            "FREE_SHIPPING" => Ok(Self::FreeShipping),
            other => Err(CouponDataError::UnknownKind(other.to_string())),
        }
    }
}

/// What a coupon takes off. `max_discount` only caps percentage discounts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Discount {
    Percentage { percent: Decimal, max_discount: Option<Decimal> },
    Fixed { amount: Decimal },
    FreeShipping,
}

impl Discount {
    /// Build from the stored `(kind, value, max_discount)` columns.
    pub fn from_parts(kind: DiscountKind, value: Decimal, max_discount: Option<Decimal>) -> Result<Self, CouponDataError> {
        match kind {
            DiscountKind::Percentage if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED => Err(CouponDataError::PercentOutOfRange(value)),
            DiscountKind::Percentage => Ok(Self::Percentage { percent: value, max_discount }),
            DiscountKind::Fixed if value < Decimal::ZERO => Err(CouponDataError::NegativeAmount(value)),
            DiscountKind::Fixed => Ok(Self::Fixed { amount: value }),
            DiscountKind::FreeShipping => Ok(Self::FreeShipping),
        }
    }

    pub fn kind(&self) -> DiscountKind {
        match self {
            Self::Percentage { .. } => DiscountKind::Percentage,
            Self::Fixed { .. } => DiscountKind::Fixed,
            Self::FreeShipping => DiscountKind::FreeShipping,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: CouponCode,
    pub discount: Discount,
    pub min_purchase: Option<Decimal>,
    pub usage_limit: Option<u32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl Coupon {
    pub fn new(code: CouponCode, discount: Discount) -> Self {
        Self { id: Uuid::now_v7(), code, discount, min_purchase: None, usage_limit: None, starts_at: None, ends_at: None, active: true }
    }

    /// No start means active immediately; no end means it never expires.
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.starts_at.map_or(true, |start| now >= start) && self.ends_at.map_or(true, |end| now <= end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponDataError {
    #[error("unknown discount kind {0}")]
    UnknownKind(String),
    #[error("percentage {0} is outside 0-100")]
    PercentOutOfRange(Decimal),
    #[error("negative discount amount {0}")]
    NegativeAmount(Decimal),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_discount_from_parts() {
        let d = Discount::from_parts("PERCENTAGE".parse().unwrap(), Decimal::new(10, 0), Some(Decimal::new(5, 0))).unwrap();
        assert_eq!(d.kind(), DiscountKind::Percentage);
        assert!(Discount::from_parts(DiscountKind::Percentage, Decimal::new(101, 0), None).is_err());
        assert!(Discount::from_parts(DiscountKind::Fixed, Decimal::new(-1, 0), None).is_err());
        // The stored value of a free-shipping coupon is ignored.
        assert_eq!(Discount::from_parts(DiscountKind::FreeShipping, Decimal::new(99, 0), None).unwrap(), Discount::FreeShipping);
        assert!("BOGO".parse::<DiscountKind>().is_err());
    }

    #[test]
    fn test_window() {
        let now = Utc::now();
        let mut c = Coupon::new(CouponCode::new("WINDOW").unwrap(), Discount::FreeShipping);
        assert!(c.is_within_window(now));
        c.starts_at = Some(now + Duration::hours(1));
        assert!(!c.is_within_window(now));
        c.starts_at = Some(now - Duration::hours(2));
        c.ends_at = Some(now - Duration::hours(1));
        assert!(!c.is_within_window(now));
        c.ends_at = Some(now);
        assert!(c.is_within_window(now));
    }
}
