//! Pure domain services
pub mod coupons;
pub mod pricing;

pub use coupons::{AppliedCoupon, CouponError};
pub use pricing::{PriceBreakdown, PricedLine, ShippingPolicy};
