use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::identity::Authenticated;
use super::{ApiError, AppState, ValidJson};
use crate::application::{CheckoutPreview, CheckoutReceipt, CheckoutRequest};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    pub shipping_address_id: Uuid,
    pub billing_address_id: Option<Uuid>,
    /// Blank means no coupon.
    #[validate(length(max = 64))]
    pub coupon_code: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub payment_method: Option<String>,
}

impl From<CheckoutBody> for CheckoutRequest {
    fn from(body: CheckoutBody) -> Self {
        Self {
            shipping_address_id: body.shipping_address_id,
            billing_address_id: body.billing_address_id,
            coupon_code: body.coupon_code,
            payment_method: body.payment_method,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PreviewBody {
    #[validate(length(max = 64))]
    pub coupon_code: Option<String>,
}

pub async fn checkout(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ValidJson(body): ValidJson<CheckoutBody>,
) -> Result<Json<CheckoutReceipt>, ApiError> {
    Ok(Json(state.checkout.checkout(Some(identity), body.into()).await?))
}

pub async fn preview(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
    ValidJson(body): ValidJson<PreviewBody>,
) -> Result<Json<CheckoutPreview>, ApiError> {
    Ok(Json(state.checkout.preview(Some(identity), body.coupon_code).await?))
}
