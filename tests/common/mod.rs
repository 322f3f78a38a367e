#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use opensase_storefront::application::ports::{
    AuthorizationRequest, CartStore, CommitError, EventPublisher, OrderStore, PaymentError, PaymentGateway, PaymentHandle,
    PendingAuthorization, PlacedOrder, PublishError, StockLedger, StoreError,
};
use opensase_storefront::domain::aggregates::{Cart, Order, Product};
use opensase_storefront::domain::events::DomainEvent;
use opensase_storefront::domain::value_objects::{Identity, Quantity, StockKey};
use opensase_storefront::infrastructure::{MemoryStore, StaticSettings};
use opensase_storefront::{AppContext, Ports};

/// Approves every authorization, optionally after a delay.
#[derive(Default)]
pub struct FakeGateway {
    delay: Option<Duration>,
    authorized: Mutex<Vec<AuthorizationRequest>>,
    counter: AtomicUsize,
}

impl FakeGateway {
    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn requests(&self) -> Vec<AuthorizationRequest> {
        self.authorized.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn authorize(&self, request: AuthorizationRequest) -> Result<PaymentHandle, PaymentError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.authorized.lock().unwrap().push(request);
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentHandle { id: format!("pi_{n}"), client_secret: format!("pi_{n}_secret") })
    }

    async fn list_unconfirmed(&self, _created_before: DateTime<Utc>) -> Result<Vec<PendingAuthorization>, PaymentError> {
        Ok(vec![])
    }

    async fn cancel(&self, _payment_intent_id: &str) -> Result<(), PaymentError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingEvents {
    pub fn subjects(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(DomainEvent::subject).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEvents {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Delegates reads to the memory store but fails every commit.
pub struct FailingCommits(pub MemoryStore);

#[async_trait]
impl OrderStore for FailingCommits {
    async fn place_order(&self, _cart_id: Uuid, _order: Order) -> Result<PlacedOrder, CommitError> {
        Err(StoreError::Sql(sqlx::Error::PoolTimedOut).into())
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        self.0.find_order(id).await
    }

    async fn save_status(&self, order: &Order) -> Result<(), StoreError> {
        self.0.save_status(order).await
    }

    async fn exists_for_payment_intent(&self, payment_intent_id: &str) -> Result<bool, StoreError> {
        self.0.exists_for_payment_intent(payment_intent_id).await
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub gateway: Arc<FakeGateway>,
    pub events: Arc<RecordingEvents>,
    pub context: AppContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(FakeGateway::default(), Duration::from_secs(5), StaticSettings::new(), false)
    }

    pub fn with_gateway(gateway: FakeGateway, payment_timeout: Duration) -> Self {
        Self::build(gateway, payment_timeout, StaticSettings::new(), false)
    }

    pub fn with_settings(settings: StaticSettings) -> Self {
        Self::build(FakeGateway::default(), Duration::from_secs(5), settings, false)
    }

    pub fn with_failing_commits() -> Self {
        Self::build(FakeGateway::default(), Duration::from_secs(5), StaticSettings::new(), true)
    }

    fn build(gateway: FakeGateway, payment_timeout: Duration, settings: StaticSettings, failing_commits: bool) -> Self {
        let store = MemoryStore::new();
        let gateway = Arc::new(gateway);
        let events = Arc::new(RecordingEvents::default());

        let mut ports = Ports::with_store(store.clone(), gateway.clone(), events.clone(), Arc::new(settings));
        if failing_commits {
            ports.orders = Arc::new(FailingCommits(store.clone()));
        }

        let context = AppContext::new(ports, payment_timeout, chrono::Duration::minutes(30));
        Self { store, gateway, events, context }
    }

    /// An active product with `quantity` on hand.
    pub async fn product(&self, name: &str, price: Decimal, quantity: u32) -> Product {
        let mut product = Product::create(name, price);
        product.publish().unwrap();
        product.add_inventory(StockKey::Product(product.id()), quantity).unwrap();
        self.store.insert_product(product.clone()).await;
        product
    }

    pub async fn add(&self, identity: &Identity, product: &Product, quantity: u32) {
        self.context
            .carts
            .add_item(identity.clone(), product.id(), None, Quantity::new(quantity).unwrap())
            .await
            .unwrap();
    }

    pub async fn stock_of(&self, product: &Product) -> u32 {
        self.store.stock(StockKey::Product(product.id())).await.unwrap()
    }

    /// Take stock away behind the cart's back.
    pub async fn sell_elsewhere(&self, product: &Product, quantity: u32) {
        self.store.reserve(StockKey::Product(product.id()), quantity).await.unwrap();
    }

    pub async fn cart(&self, identity: &Identity) -> Option<Cart> {
        self.store.find_cart(identity).await.unwrap()
    }
}

pub fn account(name: &str) -> Identity {
    Identity::Account(format!("{name}@example.com"))
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// `(line id, quantity)` pairs, for comparing cart contents before and after.
pub fn snapshot(cart: &Cart) -> Vec<(Uuid, u32)> {
    cart.lines().iter().map(|l| (l.id, l.quantity.value())).collect()
}
