//! OpenSASE Storefront
//!
//! Self-hosted storefront service.
//!
//! ## Features
//! - Carts for signed-in shoppers and guests
//! - Coupons (percentage, fixed amount, free shipping)
//! - Transactional checkout with payment authorization
//! - Order status management
//! - Reconciliation of orphaned payment authorizations

pub mod api;
pub mod application;
pub mod config;
pub mod context;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use context::{AppContext, Ports};
