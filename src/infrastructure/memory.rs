//! In-memory storage.
//!
//! Implements every storage port over one shared state guarded by a single async
//! mutex. Holding that lock for the whole of `place_order` makes it the checkout
//! atomic unit. Used by the test suite and `STORAGE=memory` runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::application::ports::{
    CartStore, CommitError, CouponStore, OrderStore, PlacedOrder, ProductCatalog, ReserveError, StockDecrement,
    StockLedger, StoreError,
};
use crate::domain::aggregates::{Cart, Coupon, Order, Product, ProductError};
use crate::domain::value_objects::{CouponCode, Identity, OrderNumber, StockKey};

#[derive(Default)]
struct State {
    products: HashMap<Uuid, Product>,
    variant_owners: HashMap<Uuid, Uuid>,
    carts: HashMap<Uuid, Cart>,
    coupons: HashMap<String, Coupon>,
    orders: HashMap<Uuid, Order>,
}

impl State {
    fn product_for(&self, key: StockKey) -> Option<&Product> {
        match key {
            StockKey::Product(id) => self.products.get(&id),
            StockKey::Variant(id) => self.variant_owners.get(&id).and_then(|p| self.products.get(p)),
        }
    }

    fn product_for_mut(&mut self, key: StockKey) -> Option<&mut Product> {
        let product_id = match key {
            StockKey::Product(id) => id,
            StockKey::Variant(id) => *self.variant_owners.get(&id)?,
        };
        self.products.get_mut(&product_id)
    }

    fn on_hand(&self, key: StockKey) -> Option<u32> {
        self.product_for(key).and_then(|p| p.on_hand(key))
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_product(&self, product: Product) {
        let mut state = self.state.lock().await;
        for variant in product.variants() {
            state.variant_owners.insert(variant.id, product.id());
        }
        state.products.insert(product.id(), product);
    }

    pub async fn insert_coupon(&self, coupon: Coupon) {
        self.state.lock().await.coupons.insert(coupon.code.as_str().to_string(), coupon);
    }

    pub async fn stock(&self, key: StockKey) -> Option<u32> {
        self.state.lock().await.on_hand(key)
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.state.lock().await.orders.values().cloned().collect()
    }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn find_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn find_cart(&self, owner: &Identity) -> Result<Option<Cart>, StoreError> {
        let state = self.state.lock().await;
        let Some(mut cart) = state.carts.values().find(|c| c.owner() == owner).cloned() else {
            return Ok(None);
        };
        let lines = cart
            .lines()
            .iter()
            .cloned()
            .map(|mut line| {
                if let Some(product) = state.products.get(&line.product_id) {
                    line.product_name = product.name().to_string();
                }
                line
            })
            .collect();
        cart = Cart::restore(cart.id(), cart.owner().clone(), lines, cart.created_at(), cart.updated_at());
        Ok(Some(cart))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.carts.values().any(|c| c.owner() == cart.owner() && c.id() != cart.id()) {
            return Err(StoreError::Conflict);
        }
        state.carts.insert(cart.id(), cart.clone());
        Ok(())
    }
}

#[async_trait]
impl CouponStore for MemoryStore {
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, StoreError> {
        Ok(self.state.lock().await.coupons.get(code.as_str()).cloned())
    }

    async fn count_orders_using(&self, coupon_id: Uuid) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.orders.values().filter(|o| o.coupon_id() == Some(coupon_id)).count() as u64)
    }
}

#[async_trait]
impl StockLedger for MemoryStore {
    async fn on_hand(&self, key: StockKey) -> Result<Option<u32>, StoreError> {
        Ok(self.state.lock().await.on_hand(key))
    }

    async fn reserve(&self, key: StockKey, quantity: u32) -> Result<u32, ReserveError> {
        let mut state = self.state.lock().await;
        let product = state.product_for_mut(key).ok_or(ReserveError::UnknownKey(key))?;
        product.remove_inventory(key, quantity).map_err(|e| match e {
            ProductError::InsufficientInventory { available } => ReserveError::InsufficientStock { key, available },
            _ => ReserveError::UnknownKey(key),
        })
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn place_order(&self, cart_id: Uuid, mut order: Order) -> Result<PlacedOrder, CommitError> {
        let mut state = self.state.lock().await;

        let mut requested: BTreeMap<StockKey, u32> = BTreeMap::new();
        for line in order.lines() {
            *requested.entry(line.stock_key()).or_default() += line.quantity.value();
        }

        // Validate every key before touching any of them.
        for (&key, &quantity) in &requested {
            if state.on_hand(key).unwrap_or(0) < quantity {
                let item = order.lines().iter().find(|l| l.stock_key() == key).map_or_else(|| key.to_string(), |l| l.name.clone());
                return Err(CommitError::InsufficientStock { item });
            }
        }

        while state.orders.values().any(|o| o.order_number() == order.order_number()) {
            order.reassign_number(OrderNumber::generate(Utc::now()));
        }

        let mut decrements = Vec::with_capacity(requested.len());
        for (key, quantity) in requested {
            let remaining = state
                .product_for_mut(key)
                .ok_or_else(|| StoreError::Corrupt(format!("stock for {key} vanished")))?
                .remove_inventory(key, quantity)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            decrements.push(StockDecrement { key, quantity, remaining });
        }

        if let Some(cart) = state.carts.get_mut(&cart_id) {
            cart.clear();
        }

        let mut stored = order.clone();
        stored.take_events();
        state.orders.insert(stored.id(), stored);

        Ok(PlacedOrder { order, decrements })
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn save_status(&self, order: &Order) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let stored = state.orders.get_mut(&order.id()).ok_or(StoreError::NotFound)?;
        let mut updated = order.clone();
        updated.take_events();
        *stored = updated;
        Ok(())
    }

    async fn exists_for_payment_intent(&self, payment_intent_id: &str) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state.orders.values().any(|o| o.payment_intent_id() == Some(payment_intent_id)))
    }
}
