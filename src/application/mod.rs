//! Use cases and the ports they depend on.

pub mod carts;
pub mod checkout;
pub mod coupons;
pub mod errors;
pub mod orders;
pub mod ports;
pub mod reconciliation;

pub use carts::{CartService, CartServiceError, CartSummary};
pub use checkout::{CheckoutPreview, CheckoutReceipt, CheckoutRequest, CheckoutService};
pub use coupons::CouponEvaluator;
pub use errors::CheckoutError;
pub use orders::{OrderService, OrderServiceError, OrderUpdate};
pub use reconciliation::{OrphanReconciler, ReconcileReport};

/// Store settings read through the `ConfigProvider`.
pub mod keys {
    pub const STORE_CURRENCY: &str = "store_currency";
    pub const DEFAULT_CURRENCY: &str = "usd";
    pub const SHIPPING_FLAT_RATE: &str = "shipping_flat_rate";
    pub const FREE_SHIPPING_THRESHOLD: &str = "free_shipping_threshold";
    pub const STRIPE_SECRET_KEY: &str = "stripe_secret_key";
    pub const PAYMENT_RECONCILIATION_ENABLED: &str = "payment_reconciliation_enabled";
    pub const ADMIN_API_TOKEN: &str = "admin_api_token";
}
