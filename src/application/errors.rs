//! Checkout error taxonomy.

use thiserror::Error;

use crate::application::coupons::CouponEvaluationError;
use crate::application::ports::{PaymentError, StoreError};
use crate::domain::services::coupons::CouponError;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Unauthorized")]
    Unauthenticated,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Insufficient stock for {item}")]
    InsufficientStock { item: String },

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error("Payment authorization failed")]
    PaymentAuthorizationFailed(#[source] PaymentError),

    /// The atomic unit failed after a payment authorization was obtained.
    #[error("Failed to create order")]
    PersistenceFailed(#[source] StoreError),

    /// Unexpected storage failure before anything was mutated.
    #[error("Failed to create order")]
    Storage(#[from] StoreError),
}

impl CheckoutError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::EmptyCart => "EMPTY_CART",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::Coupon(CouponError::InvalidCoupon) => "INVALID_COUPON",
            Self::Coupon(CouponError::CouponExpired) => "COUPON_EXPIRED",
            Self::Coupon(CouponError::UsageLimitReached) => "USAGE_LIMIT_REACHED",
            Self::Coupon(CouponError::MinimumNotMet { .. }) => "MINIMUM_NOT_MET",
            Self::PaymentAuthorizationFailed(_) => "PAYMENT_AUTHORIZATION_FAILED",
            Self::PersistenceFailed(_) | Self::Storage(_) => "INTERNAL",
        }
    }
}

impl From<CouponEvaluationError> for CheckoutError {
    fn from(error: CouponEvaluationError) -> Self {
        match error {
            CouponEvaluationError::Rejected(e) => Self::Coupon(e),
            CouponEvaluationError::Store(e) => Self::Storage(e),
        }
    }
}
