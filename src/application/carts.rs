//! Cart use cases: the ordinary add/update/remove mutations outside checkout.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::application::ports::{CartStore, ProductCatalog, StockLedger, StoreError};
use crate::domain::aggregates::{Cart, CartLine};
use crate::domain::value_objects::{Identity, Quantity, StockKey};

#[derive(Debug, Error)]
pub enum CartServiceError {
    #[error("Unauthorized")]
    Unauthenticated,

    #[error("Product not found")]
    ProductNotFound,

    #[error("Item not found")]
    LineNotFound,

    #[error("Insufficient stock")]
    InsufficientStock { available: u32 },

    #[error("Failed to update cart")]
    Store(#[from] StoreError),
}

impl CartServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::ProductNotFound => "PRODUCT_NOT_FOUND",
            Self::LineNotFound => "ITEM_NOT_FOUND",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::Store(_) => "INTERNAL",
        }
    }
}

/// Cart contents as shown to the shopper.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub items: Vec<CartLine>,
    pub subtotal: Decimal,
    pub item_count: u32,
}

impl From<&Cart> for CartSummary {
    fn from(cart: &Cart) -> Self {
        Self { items: cart.lines().to_vec(), subtotal: cart.subtotal(), item_count: cart.item_count() }
    }
}

#[derive(Clone)]
pub struct CartService {
    catalog: Arc<dyn ProductCatalog>,
    carts: Arc<dyn CartStore>,
    stock: Arc<dyn StockLedger>,
}

impl CartService {
    pub fn new(catalog: Arc<dyn ProductCatalog>, carts: Arc<dyn CartStore>, stock: Arc<dyn StockLedger>) -> Self {
        Self { catalog, carts, stock }
    }

    /// An identity without a cart sees an empty one.
    pub async fn get(&self, identity: Option<&Identity>) -> Result<CartSummary, CartServiceError> {
        let Some(identity) = identity else {
            return Ok(CartSummary::default());
        };
        Ok(self.carts.find_cart(identity).await?.as_ref().map(CartSummary::from).unwrap_or_default())
    }

    /// Add `quantity` of a product (or one of its variants). The cart is created
    /// on first add; adding an existing pair merges into its line.
    pub async fn add_item(
        &self,
        identity: Identity,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: Quantity,
    ) -> Result<CartSummary, CartServiceError> {
        let product = self
            .catalog
            .find_product(product_id)
            .await?
            .filter(|p| p.is_active())
            .ok_or(CartServiceError::ProductNotFound)?;
        let unit_price = product.unit_price(variant_id).map_err(|_| CartServiceError::ProductNotFound)?;

        let mut cart = match self.carts.find_cart(&identity).await? {
            Some(cart) => cart,
            None => Cart::new(identity),
        };

        let in_cart = cart.find_line(product_id, variant_id).map_or(0, |l| l.quantity.value());
        self.ensure_available(product.stock_key(variant_id), in_cart.saturating_add(quantity.value())).await?;

        cart.add_line(product_id, variant_id, product.name(), quantity, unit_price);
        self.carts.save_cart(&cart).await?;

        debug!(cart_id = %cart.id(), %product_id, quantity = quantity.value(), "item added to cart");

        Ok(CartSummary::from(&cart))
    }

    pub async fn update_item(&self, identity: Option<&Identity>, line_id: Uuid, quantity: Quantity) -> Result<CartSummary, CartServiceError> {
        let mut cart = self.owned_cart(identity, line_id).await?;
        let key = cart.line(line_id).map(CartLine::stock_key).ok_or(CartServiceError::LineNotFound)?;
        self.ensure_available(key, quantity.value()).await?;

        cart.update_quantity(line_id, quantity).map_err(|_| CartServiceError::LineNotFound)?;
        self.carts.save_cart(&cart).await?;

        Ok(CartSummary::from(&cart))
    }

    pub async fn remove_item(&self, identity: Option<&Identity>, line_id: Uuid) -> Result<CartSummary, CartServiceError> {
        let mut cart = self.owned_cart(identity, line_id).await?;

        cart.remove_line(line_id).map_err(|_| CartServiceError::LineNotFound)?;
        self.carts.save_cart(&cart).await?;

        Ok(CartSummary::from(&cart))
    }

    /// The identity's cart, provided it holds `line_id`. Lines in other carts
    /// are indistinguishable from missing ones.
    async fn owned_cart(&self, identity: Option<&Identity>, line_id: Uuid) -> Result<Cart, CartServiceError> {
        let identity = identity.ok_or(CartServiceError::Unauthenticated)?;
        self.carts
            .find_cart(identity)
            .await?
            .filter(|cart| cart.line(line_id).is_some())
            .ok_or(CartServiceError::LineNotFound)
    }

    async fn ensure_available(&self, key: StockKey, requested: u32) -> Result<(), CartServiceError> {
        let available = self.stock.on_hand(key).await?.unwrap_or(0);
        if available < requested {
            return Err(CartServiceError::InsufficientStock { available });
        }
        Ok(())
    }
}
