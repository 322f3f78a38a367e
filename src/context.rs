//! App Context

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::application::ports::{
    CartStore, ConfigProvider, CouponStore, EventPublisher, OrderStore, PaymentGateway, ProductCatalog, StockLedger,
};
use crate::application::{CartService, CheckoutService, CouponEvaluator, OrderService, OrphanReconciler};
use crate::config::{AppConfig, StorageBackend};
use crate::infrastructure::postgres::{self, PgStore};
use crate::infrastructure::{
    AesCbcCipher, MemoryStore, NatsEventPublisher, PgSettingsProvider, SecretCipher, StaticSettings, StripeGateway,
};

/// Everything the use cases depend on.
#[derive(Clone)]
pub struct Ports {
    pub catalog: Arc<dyn ProductCatalog>,
    pub carts: Arc<dyn CartStore>,
    pub coupons: Arc<dyn CouponStore>,
    pub stock: Arc<dyn StockLedger>,
    pub orders: Arc<dyn OrderStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub events: Arc<dyn EventPublisher>,
    pub config: Arc<dyn ConfigProvider>,
}

impl Ports {
    /// All storage ports served by one store.
    pub fn with_store<S>(store: S, gateway: Arc<dyn PaymentGateway>, events: Arc<dyn EventPublisher>, config: Arc<dyn ConfigProvider>) -> Self
    where
        S: ProductCatalog + CartStore + CouponStore + StockLedger + OrderStore + 'static,
    {
        let store = Arc::new(store);
        Self {
            catalog: store.clone(),
            carts: store.clone(),
            coupons: store.clone(),
            stock: store.clone(),
            orders: store,
            gateway,
            events,
            config,
        }
    }
}

#[derive(Clone)]
pub struct AppContext {
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub reconciler: OrphanReconciler,
    pub config: Arc<dyn ConfigProvider>,
}

impl AppContext {
    pub fn new(ports: Ports, payment_timeout: Duration, reconcile_min_age: chrono::Duration) -> Self {
        let Ports { catalog, carts, coupons, stock, orders, gateway, events, config } = ports;

        Self {
            carts: CartService::new(catalog, carts.clone(), stock.clone()),
            checkout: CheckoutService::new(
                carts,
                stock,
                CouponEvaluator::new(coupons),
                orders.clone(),
                gateway.clone(),
                events.clone(),
                config.clone(),
                payment_timeout,
            ),
            orders: OrderService::new(orders.clone(), events.clone()),
            reconciler: OrphanReconciler::new(orders, gateway, events, config.clone(), reconcile_min_age),
            config,
        }
    }

    /// Connect the configured adapters.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let events = Arc::new(NatsEventPublisher::new(connect_nats(config.nats_url.as_deref()).await));

        let settings: Arc<dyn ConfigProvider>;
        let store = match (config.storage, config.database_url.as_deref()) {
            (StorageBackend::Postgres, Some(url)) => {
                let pool = postgres::connect(url, config.database_max_connections).await?;
                info!("connected to database");
                let cipher = config
                    .settings_encryption_key
                    .as_deref()
                    .map(|key| Arc::new(AesCbcCipher::from_passphrase(key)) as Arc<dyn SecretCipher>);
                settings = Arc::new(PgSettingsProvider::new(pool.clone(), cipher));
                Store::Postgres(PgStore::new(pool))
            }
            (StorageBackend::Postgres, None) => anyhow::bail!("DATABASE_URL must be set"),
            (StorageBackend::Memory, _) => {
                warn!("using in-memory storage; data is lost on restart");
                settings = Arc::new(StaticSettings::new());
                Store::Memory(MemoryStore::new())
            }
        };
        let gateway = Arc::new(StripeGateway::new(config.stripe_api_base.clone(), settings.clone(), config.payment_timeout)?);

        let ports = match store {
            Store::Postgres(store) => Ports::with_store(store, gateway, events, settings),
            Store::Memory(store) => Ports::with_store(store, gateway, events, settings),
        };

        Ok(Self::new(ports, config.payment_timeout, config.reconcile_min_age))
    }
}

enum Store {
    Postgres(PgStore),
    Memory(MemoryStore),
}

async fn connect_nats(url: Option<&str>) -> Option<async_nats::Client> {
    let url = url?;
    match async_nats::connect(url).await {
        Ok(client) => {
            info!(url, "connected to NATS");
            Some(client)
        }
        Err(error) => {
            warn!(url, error = %error, "NATS unavailable; events will only be logged");
            None
        }
    }
}
