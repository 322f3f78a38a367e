use axum::extract::{Path, State};
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use super::identity::{new_guest_token, session_cookie};
use super::{ApiError, AppState, Caller, ValidJson};
use crate::application::CartSummary;
use crate::domain::value_objects::{Identity, Quantity};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddItemBody {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1))]
    #[serde(default = "one")]
    pub quantity: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemBody {
    #[validate(range(min = 1))]
    pub quantity: u32,
}

fn quantity(value: u32) -> Result<Quantity, ApiError> {
    Quantity::new(value).map_err(|e| ApiError::validation(e.to_string()))
}

pub async fn show(State(state): State<AppState>, Caller(identity): Caller) -> Result<Json<CartSummary>, ApiError> {
    Ok(Json(state.carts.get(identity.as_ref()).await?))
}

/// Guests without a session get one here, returned as a cookie.
pub async fn add_item(
    State(state): State<AppState>,
    Caller(identity): Caller,
    ValidJson(body): ValidJson<AddItemBody>,
) -> Result<Response, ApiError> {
    let (identity, minted) = match identity {
        Some(identity) => (identity, None),
        None => {
            let token = new_guest_token();
            debug!("new guest session");
            (Identity::Session(token.clone()), Some(token))
        }
    };

    let summary = state.carts.add_item(identity, body.product_id, body.variant_id, quantity(body.quantity)?).await?;

    let mut response = Json(summary).into_response();
    if let Some(token) = minted {
        let cookie = session_cookie(&token).ok_or_else(ApiError::internal)?;
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    Ok(response)
}

pub async fn update_item(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(item_id): Path<Uuid>,
    ValidJson(body): ValidJson<UpdateItemBody>,
) -> Result<Json<CartSummary>, ApiError> {
    Ok(Json(state.carts.update_item(identity.as_ref(), item_id, quantity(body.quantity)?).await?))
}

pub async fn remove_item(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Path(item_id): Path<Uuid>,
) -> Result<Json<CartSummary>, ApiError> {
    Ok(Json(state.carts.remove_item(identity.as_ref(), item_id).await?))
}
