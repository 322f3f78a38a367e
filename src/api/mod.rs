//! HTTP surface.

use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use validator::Validate;

use crate::application::keys;
use crate::context::AppContext;

pub mod carts;
pub mod checkout;
pub mod errors;
pub mod identity;
pub mod orders;

pub use errors::ApiError;
pub use identity::Caller;

pub const SERVICE_NAME: &str = "opensase-storefront";

pub type AppState = AppContext;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/cart", get(carts::show).post(carts::add_item))
        .route("/api/v1/cart/:item_id", patch(carts::update_item).delete(carts::remove_item))
        .route("/api/v1/checkout", post(checkout::checkout))
        .route("/api/v1/checkout/preview", post(checkout::preview))
        .route("/api/v1/orders/:id", get(orders::show))
        .route("/api/v1/admin/orders/:id", patch(orders::admin_update))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": SERVICE_NAME}))
}

/// JSON body that has passed its `validator` rules.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| ApiError::validation(e.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Admin routes need `Authorization: Bearer <admin_api_token>`. With no token
/// configured they are closed.
async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = state.config.get_secret(keys::ADMIN_API_TOKEN).await.map_err(|error| {
        tracing::error!(error = ?error, "failed to read admin token");
        ApiError::internal()
    })?;

    let presented = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()).and_then(|v| v.strip_prefix("Bearer "));

    match (expected, presented) {
        (Some(expected), Some(presented)) if constant_time_eq(expected.as_bytes(), presented.as_bytes()) => Ok(()),
        _ => Err(ApiError::forbidden()),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
