//! Errors

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::application::{CartServiceError, CheckoutError, OrderServiceError};

/// An error as the client sees it: a status, a message and a stable kind.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self { status, kind, message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message)
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", "Forbidden")
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message, "kind": self.kind }))).into_response()
    }
}

impl From<CheckoutError> for ApiError {
    fn from(error: CheckoutError) -> Self {
        let status = match &error {
            CheckoutError::Unauthenticated => StatusCode::UNAUTHORIZED,
            CheckoutError::PersistenceFailed(source) | CheckoutError::Storage(source) => {
                error!(error = ?source, "checkout failed unexpectedly");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            CheckoutError::EmptyCart
            | CheckoutError::InsufficientStock { .. }
            | CheckoutError::Coupon(_)
            | CheckoutError::PaymentAuthorizationFailed(_) => StatusCode::BAD_REQUEST,
        };
        Self::new(status, error.kind(), error.to_string())
    }
}

impl From<CartServiceError> for ApiError {
    fn from(error: CartServiceError) -> Self {
        let status = match &error {
            CartServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            CartServiceError::ProductNotFound | CartServiceError::LineNotFound => StatusCode::NOT_FOUND,
            CartServiceError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
            CartServiceError::Store(source) => {
                error!(error = ?source, "cart update failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, error.kind(), error.to_string())
    }
}

impl From<OrderServiceError> for ApiError {
    fn from(error: OrderServiceError) -> Self {
        let status = match &error {
            OrderServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            OrderServiceError::NotFound => StatusCode::NOT_FOUND,
            OrderServiceError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            OrderServiceError::Store(source) => {
                error!(error = ?source, "order operation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, error.kind(), error.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::validation(errors.to_string())
    }
}
