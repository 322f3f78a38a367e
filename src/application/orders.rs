//! Order reads for shoppers and status updates for administrators.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::ports::{EventPublisher, OrderStore, StoreError};
use crate::domain::aggregates::{FulfillmentStatus, Order, OrderError, OrderStatus, PaymentStatus};
use crate::domain::value_objects::Identity;

#[derive(Debug, Error)]
pub enum OrderServiceError {
    #[error("Unauthorized")]
    Unauthenticated,

    #[error("Order not found")]
    NotFound,

    #[error("Cannot move order from {} to {}", from.as_str(), to.as_str())]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Failed to update order")]
    Store(#[from] StoreError),
}

impl OrderServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::NotFound => "ORDER_NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::Store(_) => "INTERNAL",
        }
    }
}

/// Administrator changes to an order. Absent fields are left as they are.
#[derive(Clone, Debug, Default)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub fulfillment_status: Option<FulfillmentStatus>,
    pub tracking_number: Option<String>,
    pub shipping_carrier: Option<String>,
}

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    events: Arc<dyn EventPublisher>,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderStore>, events: Arc<dyn EventPublisher>) -> Self {
        Self { orders, events }
    }

    /// An order belonging to `identity`. Orders of other owners are reported as missing.
    pub async fn get_for_owner(&self, identity: Option<&Identity>, id: Uuid) -> Result<Order, OrderServiceError> {
        let identity = identity.ok_or(OrderServiceError::Unauthenticated)?;
        self.orders
            .find_order(id)
            .await?
            .filter(|order| order.owner() == identity)
            .ok_or(OrderServiceError::NotFound)
    }

    pub async fn update(&self, id: Uuid, update: OrderUpdate) -> Result<Order, OrderServiceError> {
        let now = Utc::now();
        let mut order = self.orders.find_order(id).await?.ok_or(OrderServiceError::NotFound)?;

        // Re-sending the current status only updates the other fields.
        if let Some(status) = update.status.filter(|s| *s != order.status()) {
            order.transition_to(status, now).map_err(|e| match e {
                OrderError::InvalidTransition { from, to } => OrderServiceError::InvalidTransition { from, to },
                other => OrderServiceError::Store(StoreError::Corrupt(other.to_string())),
            })?;
        }
        if let Some(status) = update.payment_status {
            order.set_payment_status(status, now);
        }
        if let Some(status) = update.fulfillment_status {
            order.set_fulfillment_status(status, now);
        }
        if update.tracking_number.is_some() || update.shipping_carrier.is_some() {
            order.set_tracking(update.tracking_number, update.shipping_carrier, now);
        }

        self.orders.save_status(&order).await?;
        info!(order_number = %order.order_number(), status = order.status().as_str(), "order updated");

        for event in order.take_events() {
            if let Err(error) = self.events.publish(&event).await {
                warn!(subject = event.subject(), error = ?error, "failed to publish event");
            }
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use testresult::TestResult;

    use super::*;
    use crate::application::ports::{MockEventPublisher, MockOrderStore};
    use crate::domain::aggregates::{NewOrder, OrderLine};
    use crate::domain::events::{DomainEvent, OrderEvent};
    use crate::domain::services::pricing::PriceBreakdown;
    use crate::domain::value_objects::{OrderNumber, Quantity};

    fn pending_order(owner: Identity) -> Order {
        let line = OrderLine::snapshot(Uuid::now_v7(), None, "Lamp", Decimal::new(30, 0), Quantity::new(1).unwrap());
        let pricing = PriceBreakdown {
            subtotal: Decimal::new(30, 0),
            discount: Decimal::ZERO,
            shipping: Decimal::new(10, 0),
            tax: Decimal::ZERO,
            total: Decimal::new(40, 0),
        };
        let address = Uuid::now_v7();
        let mut order = Order::place(
            NewOrder {
                order_number: OrderNumber::generate(Utc::now()),
                owner,
                currency: "usd".into(),
                lines: vec![line],
                pricing,
                shipping_address_id: address,
                billing_address_id: address,
                coupon_id: None,
                payment_method: "CARD".into(),
                payment_intent_id: Some("pi_1".into()),
            },
            Utc::now(),
        )
        .unwrap();
        order.take_events();
        order
    }

    #[tokio::test]
    async fn other_owners_orders_are_not_found() {
        let order = pending_order(Identity::Account("owner@example.com".into()));
        let mut store = MockOrderStore::new();
        store.expect_find_order().returning(move |_| Ok(Some(order.clone())));

        let service = OrderService::new(Arc::new(store), Arc::new(MockEventPublisher::new()));
        let result = service.get_for_owner(Some(&Identity::Account("intruder@example.com".into())), Uuid::now_v7()).await;

        assert!(matches!(result, Err(OrderServiceError::NotFound)));
    }

    #[tokio::test]
    async fn shipping_stamps_timestamp_and_publishes() -> TestResult {
        let order = pending_order(Identity::Session("guest_1".into()));
        let mut store = MockOrderStore::new();
        store.expect_find_order().returning(move |_| Ok(Some(order.clone())));
        store
            .expect_save_status()
            .withf(|o| o.status() == OrderStatus::Shipped && o.shipped_at().is_some())
            .times(1)
            .returning(|_| Ok(()));
        let mut events = MockEventPublisher::new();
        events
            .expect_publish()
            .withf(|e| matches!(e, DomainEvent::Order(OrderEvent::StatusChanged { to: OrderStatus::Shipped, .. })))
            .times(1)
            .returning(|_| Ok(()));

        let service = OrderService::new(Arc::new(store), Arc::new(events));
        let update = OrderUpdate { status: Some(OrderStatus::Shipped), tracking_number: Some("1Z999".into()), ..Default::default() };
        let order = service.update(Uuid::now_v7(), update).await?;

        assert_eq!(order.tracking_number(), Some("1Z999"));
        assert_eq!(order.shipping_carrier(), None);

        Ok(())
    }

    #[tokio::test]
    async fn terminal_orders_reject_transitions() {
        let mut order = pending_order(Identity::Session("guest_1".into()));
        order.transition_to(OrderStatus::Cancelled, Utc::now()).unwrap();
        order.take_events();

        let mut store = MockOrderStore::new();
        store.expect_find_order().returning(move |_| Ok(Some(order.clone())));
        store.expect_save_status().never();

        let service = OrderService::new(Arc::new(store), Arc::new(MockEventPublisher::new()));
        let result = service.update(Uuid::now_v7(), OrderUpdate { status: Some(OrderStatus::Processing), ..Default::default() }).await;

        assert!(
            matches!(result, Err(OrderServiceError::InvalidTransition { from: OrderStatus::Cancelled, to: OrderStatus::Processing })),
            "got {result:?}"
        );
    }
}
