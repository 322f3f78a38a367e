//! Cleanup of orphaned payment authorizations.
//!
//! A checkout whose commit fails after the processor authorized the payment
//! leaves a hold with no order. This pass finds unconfirmed authorizations older
//! than `min_age` and cancels those no order refers to. Running it twice is harmless:
//! cancelled authorizations are no longer listed as unconfirmed.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::keys;
use crate::application::ports::{ConfigProvider, EventPublisher, OrderStore, PaymentError, PaymentGateway};
use crate::domain::events::{DomainEvent, PaymentEvent};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub examined: usize,
    pub cancelled: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct OrphanReconciler {
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    events: Arc<dyn EventPublisher>,
    config: Arc<dyn ConfigProvider>,
    min_age: Duration,
}

impl OrphanReconciler {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        events: Arc<dyn EventPublisher>,
        config: Arc<dyn ConfigProvider>,
        min_age: Duration,
    ) -> Self {
        Self { orders, gateway, events, config, min_age }
    }

    /// Runs one pass, or does nothing when reconciliation is switched off.
    pub async fn run_if_enabled(&self) -> Result<Option<ReconcileReport>, PaymentError> {
        if !self.config.is_feature_enabled(keys::PAYMENT_RECONCILIATION_ENABLED).await {
            return Ok(None);
        }
        self.run_once().await.map(Some)
    }

    #[tracing::instrument(name = "reconcile_authorizations", skip(self))]
    pub async fn run_once(&self) -> Result<ReconcileReport, PaymentError> {
        let cutoff = Utc::now() - self.min_age;
        let pending = self.gateway.list_unconfirmed(cutoff).await?;

        let mut report = ReconcileReport { examined: pending.len(), ..Default::default() };

        for authorization in pending {
            match self.orders.exists_for_payment_intent(&authorization.id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(error) => {
                    // Without an answer the authorization may belong to an order.
                    warn!(payment_intent_id = %authorization.id, error = ?error, "skipping authorization, order lookup failed");
                    report.failed.push(authorization.id);
                    continue;
                }
            }

            match self.gateway.cancel(&authorization.id).await {
                Ok(()) => {
                    info!(payment_intent_id = %authorization.id, created_at = %authorization.created_at, "cancelled orphaned authorization");
                    let event = DomainEvent::Payment(PaymentEvent::AuthorizationCancelled { payment_intent_id: authorization.id.clone() });
                    if let Err(error) = self.events.publish(&event).await {
                        warn!(subject = event.subject(), error = ?error, "failed to publish event");
                    }
                    report.cancelled.push(authorization.id);
                }
                Err(error) => {
                    warn!(payment_intent_id = %authorization.id, error = ?error, "failed to cancel orphaned authorization");
                    report.failed.push(authorization.id);
                }
            }
        }

        info!(examined = report.examined, cancelled = report.cancelled.len(), failed = report.failed.len(), "reconciliation finished");

        Ok(report)
    }
}
