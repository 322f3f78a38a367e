//! Checkout Orchestrator
//!
//! validate → price → authorize → persist → decrement → clear-cart. Everything up
//! to the authorization is side-effect free; persistence, stock decrements and
//! clearing the cart happen in one atomic unit owned by the [`OrderStore`].

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::application::coupons::CouponEvaluator;
use crate::application::errors::CheckoutError;
use crate::application::keys;
use crate::application::ports::{
    AuthorizationRequest, CartStore, CommitError, ConfigProvider, EventPublisher, OrderStore,
    PaymentError, PaymentGateway, PaymentHandle, StockLedger, StoreError,
};
use crate::domain::aggregates::{Cart, NewOrder, Order, OrderLine};
use crate::domain::events::{DomainEvent, InventoryEvent, PaymentEvent};
use crate::domain::services::coupons::AppliedCoupon;
use crate::domain::services::pricing::{self, PriceBreakdown, ShippingPolicy};
use crate::domain::value_objects::{Identity, OrderNumber};

pub const DEFAULT_PAYMENT_METHOD: &str = "CARD";

#[derive(Clone, Debug)]
pub struct CheckoutRequest {
    pub shipping_address_id: Uuid,
    pub billing_address_id: Option<Uuid>,
    pub coupon_code: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutReceipt {
    pub order: Order,
    #[serde(rename = "paymentHandle")]
    pub payment: PaymentHandle,
}

#[derive(Debug, Serialize)]
pub struct CheckoutPreview {
    pub currency: String,
    pub pricing: PriceBreakdown,
    pub coupon: Option<AppliedCoupon>,
}

#[derive(Clone)]
pub struct CheckoutService {
    carts: Arc<dyn CartStore>,
    stock: Arc<dyn StockLedger>,
    coupons: CouponEvaluator,
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    events: Arc<dyn EventPublisher>,
    config: Arc<dyn ConfigProvider>,
    payment_timeout: Duration,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        carts: Arc<dyn CartStore>,
        stock: Arc<dyn StockLedger>,
        coupons: CouponEvaluator,
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        events: Arc<dyn EventPublisher>,
        config: Arc<dyn ConfigProvider>,
        payment_timeout: Duration,
    ) -> Self {
        Self { carts, stock, coupons, orders, gateway, events, config, payment_timeout }
    }

    /// Turn the identity's cart into a `Pending` order and a payment handle the
    /// client confirms afterwards.
    pub async fn checkout(&self, identity: Option<Identity>, request: CheckoutRequest) -> Result<CheckoutReceipt, CheckoutError> {
        let identity = identity.ok_or(CheckoutError::Unauthenticated)?;
        let span = tracing::info_span!("checkout", identity = %identity);

        let result = self.run_checkout(identity, request).instrument(span.clone()).await;
        if let Err(error) = &result {
            span.in_scope(|| info!(kind = error.kind(), "checkout aborted"));
        }
        result
    }

    /// Price the identity's cart without touching stock, payments or orders.
    pub async fn preview(&self, identity: Option<Identity>, coupon_code: Option<String>) -> Result<CheckoutPreview, CheckoutError> {
        let identity = identity.ok_or(CheckoutError::Unauthenticated)?;
        let cart = self.load_cart(&identity).await?;
        let coupon = self.evaluate_coupon(&cart, coupon_code.as_deref()).await?;
        let pricing = pricing::price(cart.lines(), coupon.as_ref(), &self.shipping_policy().await);
        let currency = self.config.get_string(keys::STORE_CURRENCY, keys::DEFAULT_CURRENCY).await;

        Ok(CheckoutPreview { currency, pricing, coupon })
    }

    async fn run_checkout(&self, identity: Identity, request: CheckoutRequest) -> Result<CheckoutReceipt, CheckoutError> {
        let now = Utc::now();

        let cart = self.load_cart(&identity).await?;
        self.check_stock(&cart).await?;

        let coupon = self.evaluate_coupon(&cart, request.coupon_code.as_deref()).await?;
        let breakdown = pricing::price(cart.lines(), coupon.as_ref(), &self.shipping_policy().await);
        let currency = self.config.get_string(keys::STORE_CURRENCY, keys::DEFAULT_CURRENCY).await;

        let mut order = Order::place(
            NewOrder {
                order_number: OrderNumber::generate(now),
                owner: identity.clone(),
                currency: currency.clone(),
                lines: snapshot_lines(&cart),
                pricing: breakdown,
                shipping_address_id: request.shipping_address_id,
                billing_address_id: request.billing_address_id.unwrap_or(request.shipping_address_id),
                coupon_id: coupon.as_ref().map(|c| c.coupon_id),
                payment_method: request.payment_method.unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string()),
                payment_intent_id: None,
            },
            now,
        )
        .map_err(|e| CheckoutError::Storage(StoreError::Corrupt(e.to_string())))?;

        let payment = self.authorize(&identity, &breakdown, &currency).await?;
        order.attach_payment_intent(payment.id.clone());

        let mut placed = match self.orders.place_order(cart.id(), order).await {
            Ok(placed) => placed,
            Err(error) => return Err(self.orphaned(&identity, &payment, error).await),
        };

        info!(
            order_number = %placed.order.order_number(),
            total = %placed.order.total(),
            payment_intent_id = %payment.id,
            "order placed"
        );

        for event in placed.order.take_events() {
            self.publish(&event).await;
        }
        for d in &placed.decrements {
            self.publish(&DomainEvent::Inventory(InventoryEvent::Decremented { key: d.key, quantity: d.quantity, remaining: d.remaining }))
                .await;
        }

        Ok(CheckoutReceipt { order: placed.order, payment })
    }

    async fn load_cart(&self, identity: &Identity) -> Result<Cart, CheckoutError> {
        self.carts
            .find_cart(identity)
            .await?
            .filter(|cart| !cart.is_empty())
            .ok_or(CheckoutError::EmptyCart)
    }

    /// Early read of current stock. Advisory only: the atomic unit re-validates.
    async fn check_stock(&self, cart: &Cart) -> Result<(), CheckoutError> {
        for (key, requested) in cart.requested_stock() {
            let available = self.stock.on_hand(key).await?.unwrap_or(0);
            if available < requested {
                let item = cart
                    .lines()
                    .iter()
                    .find(|l| l.stock_key() == key)
                    .map_or_else(|| key.to_string(), |l| l.product_name.clone());
                info!(%key, requested, available, "insufficient stock");
                return Err(CheckoutError::InsufficientStock { item });
            }
        }
        Ok(())
    }

    async fn evaluate_coupon(&self, cart: &Cart, code: Option<&str>) -> Result<Option<AppliedCoupon>, CheckoutError> {
        let Some(code) = code.filter(|c| !c.trim().is_empty()) else {
            return Ok(None);
        };
        let subtotal = pricing::subtotal(cart.lines());
        Ok(Some(self.coupons.evaluate(code, subtotal, Utc::now()).await?))
    }

    async fn authorize(&self, identity: &Identity, breakdown: &PriceBreakdown, currency: &str) -> Result<PaymentHandle, CheckoutError> {
        let amount_minor_units = breakdown
            .total_minor_units()
            .ok_or(CheckoutError::PaymentAuthorizationFailed(PaymentError::InvalidAmount))?;

        let request = AuthorizationRequest {
            amount_minor_units,
            currency: currency.to_string(),
            metadata: BTreeMap::from([("userId".to_string(), identity.as_str().to_string())]),
        };

        match tokio::time::timeout(self.payment_timeout, self.gateway.authorize(request)).await {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(error)) => {
                warn!(error = ?error, "payment authorization failed");
                Err(CheckoutError::PaymentAuthorizationFailed(error))
            }
            Err(_) => {
                warn!(timeout_ms = self.payment_timeout.as_millis() as u64, "payment authorization timed out");
                Err(CheckoutError::PaymentAuthorizationFailed(PaymentError::TimedOut))
            }
        }
    }

    /// The authorization in `payment` now has no order. It is left for the
    /// reconciliation pass; this only reports it.
    async fn orphaned(&self, identity: &Identity, payment: &PaymentHandle, error: CommitError) -> CheckoutError {
        let (reason, result) = match error {
            CommitError::InsufficientStock { item } => {
                warn!(payment_intent_id = %payment.id, orphaned_authorization = true, %item, "stock ran out inside the checkout transaction");
                (format!("insufficient stock for {item}"), CheckoutError::InsufficientStock { item })
            }
            CommitError::Store(error) => {
                error!(payment_intent_id = %payment.id, orphaned_authorization = true, error = ?error, "checkout commit failed after payment authorization");
                ("order commit failed".to_string(), CheckoutError::PersistenceFailed(error))
            }
        };

        self.publish(&DomainEvent::Payment(PaymentEvent::AuthorizationOrphaned {
            payment_intent_id: payment.id.clone(),
            owner: identity.to_string(),
            reason,
        }))
        .await;

        result
    }

    async fn shipping_policy(&self) -> ShippingPolicy {
        let defaults = ShippingPolicy::default();
        ShippingPolicy {
            flat_rate: self.decimal_setting(keys::SHIPPING_FLAT_RATE, defaults.flat_rate).await,
            free_threshold: self.decimal_setting(keys::FREE_SHIPPING_THRESHOLD, defaults.free_threshold).await,
        }
    }

    async fn decimal_setting(&self, key: &str, default: Decimal) -> Decimal {
        let raw = self.config.get_string(key, &default.to_string()).await;
        raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "invalid decimal setting, using default");
            default
        })
    }

    /// Events are best effort: a committed checkout never fails on publication.
    async fn publish(&self, event: &DomainEvent) {
        if let Err(error) = self.events.publish(event).await {
            warn!(subject = event.subject(), error = ?error, "failed to publish event");
        }
    }
}

fn snapshot_lines(cart: &Cart) -> Vec<OrderLine> {
    cart.lines()
        .iter()
        .map(|l| OrderLine::snapshot(l.product_id, l.variant_id, l.product_name.clone(), l.unit_price, l.quantity))
        .collect()
}
