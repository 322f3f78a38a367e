//! Pricing Calculator
//!
//! Derives subtotal, discount, shipping and total for a set of lines. Pure: the
//! same inputs always produce the same breakdown, so it is also used for preview
//! pricing before anything is committed.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use crate::domain::services::coupons::AppliedCoupon;
use crate::domain::value_objects::Quantity;

/// Anything that contributes `unit_price × quantity` to a subtotal.
pub trait PricedLine {
    fn unit_price(&self) -> Decimal;
    fn quantity(&self) -> Quantity;
}

/// Flat-rate shipping: free above `free_threshold` (strictly greater), otherwise `flat_rate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShippingPolicy {
    pub flat_rate: Decimal,
    pub free_threshold: Decimal,
}

impl Default for ShippingPolicy {
    fn default() -> Self { Self { flat_rate: Decimal::new(10, 0), free_threshold: Decimal::new(100, 0) } }
}

impl ShippingPolicy {
    pub fn cost(&self, subtotal: Decimal, free_shipping: bool) -> Decimal {
        if free_shipping || subtotal > self.free_threshold { Decimal::ZERO } else { self.flat_rate }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl PriceBreakdown {
    /// Amount in minor units (cents) as sent to the payment processor.
    pub fn total_minor_units(&self) -> Option<i64> {
        (self.total * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
    }
}

pub fn subtotal<L: PricedLine>(lines: &[L]) -> Decimal {
    lines.iter().map(|l| l.unit_price() * Decimal::from(l.quantity().value())).sum()
}

pub fn price<L: PricedLine>(lines: &[L], coupon: Option<&AppliedCoupon>, shipping: &ShippingPolicy) -> PriceBreakdown {
    let subtotal = subtotal(lines);
    // The discount only ever reduces the subtotal, never the shipping charge.
    let discount = coupon.map_or(Decimal::ZERO, |c| c.discount).clamp(Decimal::ZERO, subtotal);
    let free_shipping = coupon.is_some_and(|c| c.free_shipping);
    let shipping = shipping.cost(subtotal, free_shipping);
    // Tax is not computed yet.
    let tax = Decimal::ZERO;
    PriceBreakdown { subtotal, discount, shipping, tax, total: subtotal - discount + shipping + tax }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use crate::domain::value_objects::CouponCode;

    struct Line(Decimal, u32);
    impl PricedLine for Line {
        fn unit_price(&self) -> Decimal { self.0 }
        fn quantity(&self) -> Quantity { Quantity::new(self.1).unwrap() }
    }

    fn coupon(discount: Decimal, free_shipping: bool) -> AppliedCoupon {
        AppliedCoupon { coupon_id: Uuid::now_v7(), code: CouponCode::new("TEST").unwrap(), discount, free_shipping }
    }

    #[test]
    fn test_flat_rate_below_threshold() {
        let p = price(&[Line(Decimal::new(2500, 2), 2)], None, &ShippingPolicy::default());
        assert_eq!(p.subtotal, Decimal::new(50, 0));
        assert_eq!(p.shipping, Decimal::new(10, 0));
        assert_eq!(p.total, Decimal::new(60, 0));
        assert_eq!(p.total_minor_units(), Some(6000));
    }

    #[test]
    fn test_threshold_is_strict() {
        let policy = ShippingPolicy::default();
        assert_eq!(price(&[Line(Decimal::new(100, 0), 1)], None, &policy).shipping, Decimal::new(10, 0));
        assert_eq!(price(&[Line(Decimal::new(10001, 2), 1)], None, &policy).shipping, Decimal::ZERO);
    }

    #[test]
    fn test_free_shipping_coupon() {
        let p = price(&[Line(Decimal::new(40, 0), 1)], Some(&coupon(Decimal::ZERO, true)), &ShippingPolicy::default());
        assert_eq!(p.shipping, Decimal::ZERO);
        assert_eq!(p.total, Decimal::new(40, 0));
    }

    #[test]
    fn test_discount_never_exceeds_subtotal() {
        let p = price(&[Line(Decimal::new(20, 0), 1)], Some(&coupon(Decimal::new(50, 0), false)), &ShippingPolicy::default());
        assert_eq!(p.discount, Decimal::new(20, 0));
        assert_eq!(p.total, p.shipping);
    }

    #[test]
    fn test_pricing_is_repeatable() {
        let lines = [Line(Decimal::new(1999, 2), 3), Line(Decimal::new(550, 2), 1)];
        let applied = coupon(Decimal::new(5, 0), false);
        let policy = ShippingPolicy { flat_rate: Decimal::new(7, 0), free_threshold: Decimal::new(50, 0) };
        assert_eq!(price(&lines, Some(&applied), &policy), price(&lines, Some(&applied), &policy));
    }

    #[test]
    fn test_minor_units_round_half_away() {
        let p = PriceBreakdown { subtotal: Decimal::ZERO, discount: Decimal::ZERO, shipping: Decimal::ZERO, tax: Decimal::ZERO, total: Decimal::new(10005, 3) };
        assert_eq!(p.total_minor_units(), Some(1001));
    }
}
