use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{require_admin, ApiError, AppState, Caller, ValidJson};
use crate::application::OrderUpdate;
use crate::domain::aggregates::{FulfillmentStatus, Order, OrderStatus, PaymentStatus};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdminOrderBody {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub fulfillment_status: Option<FulfillmentStatus>,
    #[validate(length(min = 1, max = 128))]
    pub tracking_number: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub shipping_carrier: Option<String>,
}

impl From<AdminOrderBody> for OrderUpdate {
    fn from(body: AdminOrderBody) -> Self {
        Self {
            status: body.status,
            payment_status: body.payment_status,
            fulfillment_status: body.fulfillment_status,
            tracking_number: body.tracking_number,
            shipping_carrier: body.shipping_carrier,
        }
    }
}

pub async fn show(State(state): State<AppState>, Caller(identity): Caller, Path(id): Path<Uuid>) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.orders.get_for_owner(identity.as_ref(), id).await?))
}

pub async fn admin_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    ValidJson(body): ValidJson<AdminOrderBody>,
) -> Result<Json<Order>, ApiError> {
    require_admin(&state, &headers).await?;
    Ok(Json(state.orders.update(id, body.into()).await?))
}
