//! Domain events
//!
//! Published after the fact for downstream consumers (notifications, admin
//! dashboards). Subjects are stable; payloads are JSON.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::StockKey;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Inventory(InventoryEvent),
    Payment(PaymentEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, order_number: String, owner: String, total: Decimal, currency: String },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InventoryEvent {
    Decremented { key: StockKey, quantity: u32, remaining: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentEvent {
    /// An authorization was obtained but no order was committed for it.
    AuthorizationOrphaned { payment_intent_id: String, owner: String, reason: String },
    /// Reconciliation cancelled an orphaned authorization.
    AuthorizationCancelled { payment_intent_id: String },
}

impl DomainEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Placed { .. }) => "storefront.order.placed",
            Self::Order(OrderEvent::StatusChanged { .. }) => "storefront.order.status_changed",
            Self::Inventory(InventoryEvent::Decremented { .. }) => "storefront.inventory.decremented",
            Self::Payment(PaymentEvent::AuthorizationOrphaned { .. }) => "storefront.payment.authorization_orphaned",
            Self::Payment(PaymentEvent::AuthorizationCancelled { .. }) => "storefront.payment.authorization_cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_payload_shape() {
        let event = DomainEvent::Inventory(InventoryEvent::Decremented { key: StockKey::Product(Uuid::nil()), quantity: 2, remaining: 3 });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["aggregate"], "inventory");
        assert_eq!(json["event"]["type"], "decremented");
        assert_eq!(json["event"]["key"]["kind"], "product");
        assert_eq!(event.subject(), "storefront.inventory.decremented");
    }
}
