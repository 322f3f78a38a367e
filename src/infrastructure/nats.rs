use async_trait::async_trait;
use tracing::{debug, info};

use crate::application::ports::{EventPublisher, PublishError};
use crate::domain::events::DomainEvent;

/// Publishes domain events as JSON on NATS. Without a connection the events are
/// only logged.
#[derive(Clone, Default)]
pub struct NatsEventPublisher {
    client: Option<async_nats::Client>,
}

impl NatsEventPublisher {
    pub fn new(client: Option<async_nats::Client>) -> Self {
        Self { client }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }
}

#[async_trait]
impl EventPublisher for NatsEventPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        let subject = event.subject();
        let payload = serde_json::to_vec(event).map_err(|e| PublishError { subject, source: Box::new(e) })?;

        let Some(client) = &self.client else {
            info!(subject, payload = %String::from_utf8_lossy(&payload), "event (no broker)");
            return Ok(());
        };

        client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| PublishError { subject, source: Box::new(e) })?;
        debug!(subject, "event published");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;
    use uuid::Uuid;

    use super::*;
    use crate::domain::events::PaymentEvent;

    #[tokio::test]
    async fn without_broker_events_are_logged_only() -> TestResult {
        let publisher = NatsEventPublisher::default();
        let event = DomainEvent::Payment(PaymentEvent::AuthorizationCancelled { payment_intent_id: format!("pi_{}", Uuid::new_v4()) });

        publisher.publish(&event).await?;

        assert!(!publisher.is_connected());
        Ok(())
    }
}
