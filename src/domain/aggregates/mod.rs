//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod coupon;

pub use product::{Product, ProductError, ProductStatus, Variant};
pub use order::{FulfillmentStatus, NewOrder, Order, OrderError, OrderLine, OrderRecord, OrderStatus, PaymentStatus};
pub use cart::{Cart, CartError, CartLine};
pub use coupon::{Coupon, CouponDataError, Discount, DiscountKind};
