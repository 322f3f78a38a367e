//! Stripe PaymentIntents client.
//!
//! The secret key is resolved through the settings provider on every call, so a
//! key rotated in `system_settings` takes effect without a restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::application::keys;
use crate::application::ports::{AuthorizationRequest, ConfigProvider, PaymentError, PaymentGateway, PaymentHandle, PendingAuthorization};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

const PAGE_SIZE: &str = "100";

/// Metadata key and value stamped on every intent this service creates. The
/// reconciler only touches intents carrying it.
const SOURCE_KEY: &str = "source";
const SOURCE_TAG: &str = "opensase-storefront";

/// Statuses of an intent the customer never completed.
const UNCONFIRMED_STATUSES: [&str; 3] = ["requires_payment_method", "requires_confirmation", "requires_action"];

#[derive(Clone)]
pub struct StripeGateway {
    http: Client,
    api_base: String,
    config: Arc<dyn ConfigProvider>,
}

impl StripeGateway {
    pub fn new(api_base: impl Into<String>, config: Arc<dyn ConfigProvider>, timeout: Duration) -> Result<Self, PaymentError> {
        let http = Client::builder().timeout(timeout).build().map_err(|e| PaymentError::Unavailable(Box::new(e)))?;
        Ok(Self { http, api_base: api_base.into().trim_end_matches('/').to_string(), config })
    }

    async fn secret_key(&self) -> Result<String, PaymentError> {
        self.config
            .get_secret(keys::STRIPE_SECRET_KEY)
            .await
            .map_err(|e| PaymentError::Unavailable(Box::new(e)))?
            .ok_or(PaymentError::NotConfigured)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/payment_intents{path}", self.api_base)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, PaymentError> {
        let key = self.secret_key().await?;
        let response = request.bearer_auth(key).send().await.map_err(unavailable)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text).map(|e| e.error.message).unwrap_or(text);
            return Err(PaymentError::Rejected { status: status.as_u16(), message });
        }

        response.json().await.map_err(unavailable)
    }
}

fn unavailable(error: reqwest::Error) -> PaymentError {
    if error.is_timeout() {
        PaymentError::TimedOut
    } else {
        PaymentError::Unavailable(Box::new(error))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl IntentResponse {
    fn is_ours(&self) -> bool {
        self.metadata.get(SOURCE_KEY).map(String::as_str) == Some(SOURCE_TAG)
    }

    fn is_unconfirmed(&self) -> bool {
        UNCONFIRMED_STATUSES.contains(&self.status.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct IntentList {
    data: Vec<IntentResponse>,
    #[serde(default)]
    has_more: bool,
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn authorize(&self, request: AuthorizationRequest) -> Result<PaymentHandle, PaymentError> {
        if request.amount_minor_units <= 0 {
            return Err(PaymentError::InvalidAmount);
        }

        let mut form = vec![
            ("amount".to_string(), request.amount_minor_units.to_string()),
            ("currency".to_string(), request.currency.to_lowercase()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ];
        form.extend(request.metadata.into_iter().filter(|(k, _)| k != SOURCE_KEY).map(|(k, v)| (format!("metadata[{k}]"), v)));
        form.push((format!("metadata[{SOURCE_KEY}]"), SOURCE_TAG.to_string()));

        let intent: IntentResponse = self.send(self.http.post(self.url("")).form(&form)).await?;
        debug!(payment_intent_id = %intent.id, "payment intent created");

        Ok(PaymentHandle { client_secret: intent.client_secret.unwrap_or_default(), id: intent.id })
    }

    async fn list_unconfirmed(&self, created_before: DateTime<Utc>) -> Result<Vec<PendingAuthorization>, PaymentError> {
        let mut pending = Vec::new();
        let mut starting_after: Option<String> = None;

        loop {
            let mut query = vec![("created[lt]", created_before.timestamp().to_string()), ("limit", PAGE_SIZE.to_string())];
            if let Some(cursor) = &starting_after {
                query.push(("starting_after", cursor.clone()));
            }

            let page: IntentList = self.send(self.http.get(self.url("")).query(&query)).await?;
            starting_after = page.data.last().map(|i| i.id.clone());

            pending.extend(page.data.into_iter().filter(|i| i.is_ours() && i.is_unconfirmed()).map(|i| {
                PendingAuthorization { created_at: DateTime::from_timestamp(i.created, 0).unwrap_or(created_before), id: i.id }
            }));

            if !page.has_more || starting_after.is_none() {
                break;
            }
        }

        Ok(pending)
    }

    async fn cancel(&self, payment_intent_id: &str) -> Result<(), PaymentError> {
        let _: IntentResponse = self.send(self.http.post(self.url(&format!("/{payment_intent_id}/cancel")))).await?;
        Ok(())
    }
}
