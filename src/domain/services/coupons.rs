//! Coupon evaluation rules.
//!
//! The lookup and the usage count are I/O and live in the application layer; this
//! module holds the checks that run once both are known, in the order a shopper
//! should see them fail: activity window, usage limit, minimum purchase.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::{Coupon, Discount};
use crate::domain::value_objects::CouponCode;

/// Result of evaluating a coupon against a subtotal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCoupon {
    pub coupon_id: Uuid,
    pub code: CouponCode,
    pub discount: Decimal,
    pub free_shipping: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("Invalid coupon code")]
    InvalidCoupon,
    #[error("Coupon has expired")]
    CouponExpired,
    #[error("Coupon usage limit reached")]
    UsageLimitReached,
    #[error("Minimum order value of {minimum} required")]
    MinimumNotMet { minimum: Decimal },
}

/// Checks an active coupon against `subtotal` given how many orders already use it.
pub fn apply(coupon: &Coupon, subtotal: Decimal, usage_count: u64, now: DateTime<Utc>) -> Result<AppliedCoupon, CouponError> {
    if !coupon.active { return Err(CouponError::InvalidCoupon); }
    if !coupon.is_within_window(now) { return Err(CouponError::CouponExpired); }
    if let Some(limit) = coupon.usage_limit {
        if usage_count >= u64::from(limit) { return Err(CouponError::UsageLimitReached); }
    }
    if let Some(minimum) = coupon.min_purchase {
        if subtotal < minimum { return Err(CouponError::MinimumNotMet { minimum }); }
    }

    let (discount, free_shipping) = match coupon.discount {
        Discount::Percentage { percent, max_discount } => {
            let raw = (subtotal * percent / Decimal::ONE_HUNDRED).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            (max_discount.map_or(raw, |cap| raw.min(cap)), false)
        }
        Discount::Fixed { amount } => (amount, false),
        Discount::FreeShipping => (Decimal::ZERO, true),
    };

    Ok(AppliedCoupon {
        coupon_id: coupon.id,
        code: coupon.code.clone(),
        discount: discount.clamp(Decimal::ZERO, subtotal),
        free_shipping,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(discount: Discount) -> Coupon { Coupon::new(CouponCode::new("SAVE").unwrap(), discount) }

    #[test]
    fn test_percentage_without_cap() {
        let c = coupon(Discount::Percentage { percent: Decimal::new(10, 0), max_discount: None });
        let applied = apply(&c, Decimal::new(20000, 2), 0, Utc::now()).unwrap();
        assert_eq!(applied.discount, Decimal::new(20, 0));
        assert!(!applied.free_shipping);
    }

    #[test]
    fn test_percentage_cap() {
        let c = coupon(Discount::Percentage { percent: Decimal::new(50, 0), max_discount: Some(Decimal::new(15, 0)) });
        assert_eq!(apply(&c, Decimal::new(100, 0), 0, Utc::now()).unwrap().discount, Decimal::new(15, 0));
    }

    #[test]
    fn test_fixed_clamped_to_subtotal() {
        let c = coupon(Discount::Fixed { amount: Decimal::new(30, 0) });
        assert_eq!(apply(&c, Decimal::new(12, 0), 0, Utc::now()).unwrap().discount, Decimal::new(12, 0));
    }

    #[test]
    fn test_minimum_purchase() {
        let mut c = coupon(Discount::Fixed { amount: Decimal::new(30, 0) });
        c.min_purchase = Some(Decimal::new(50, 0));
        assert_eq!(apply(&c, Decimal::new(40, 0), 0, Utc::now()), Err(CouponError::MinimumNotMet { minimum: Decimal::new(50, 0) }));
        assert_eq!(apply(&c, Decimal::new(60, 0), 0, Utc::now()).unwrap().discount, Decimal::new(30, 0));
    }

    #[test]
    fn test_free_shipping_has_no_monetary_discount() {
        let applied = apply(&coupon(Discount::FreeShipping), Decimal::new(40, 0), 0, Utc::now()).unwrap();
        assert_eq!(applied.discount, Decimal::ZERO);
        assert!(applied.free_shipping);
    }

    #[test]
    fn test_rejections_in_order() {
        let now = Utc::now();
        let mut c = coupon(Discount::Fixed { amount: Decimal::new(5, 0) });
        c.usage_limit = Some(1);
        c.min_purchase = Some(Decimal::new(100, 0));
        assert_eq!(apply(&c, Decimal::ONE, 1, now), Err(CouponError::UsageLimitReached));
        c.ends_at = Some(now - Duration::days(1));
        assert_eq!(apply(&c, Decimal::ONE, 1, now), Err(CouponError::CouponExpired));
        c.active = false;
        assert_eq!(apply(&c, Decimal::ONE, 1, now), Err(CouponError::InvalidCoupon));
    }
}
