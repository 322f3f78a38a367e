//! Product Aggregate
//!
//! Only the parts of a catalogue product the storefront core needs: its name, the
//! price captured into carts, its purchasable status and where its stock lives.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::StockKey;

#[derive(Clone, Debug, Serialize)]
pub struct Product {
    id: Uuid,
    name: String,
    price: Decimal,
    quantity: u32,
    status: ProductStatus,
    variants: Vec<Variant>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A purchasable variant. When a variant is selected its own quantity is the only
/// stock that counts; `price` overrides the product price when set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Variant { pub id: Uuid, pub name: String, pub price: Option<Decimal>, pub quantity: u32 }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus { #[default] Draft, Active, Archived }

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Draft => "DRAFT", Self::Active => "ACTIVE", Self::Archived => "ARCHIVED" }
    }
}

impl FromStr for ProductStatus {
    type Err = ProductError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "ACTIVE" => Ok(Self::Active),
            "ARCHIVED" => Ok(Self::Archived),
            other => Err(ProductError::UnknownStatus(other.to_string())),
        }
    }
}

impl Product {
    pub fn create(name: impl Into<String>, price: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: name.into(), price, quantity: 0,
            status: ProductStatus::Draft, variants: vec![], created_at: now, updated_at: now,
        }
    }

    /// Rebuild a product from storage.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid, name: String, price: Decimal, quantity: u32, status: ProductStatus,
        variants: Vec<Variant>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self { id, name, price, quantity, status, variants, created_at, updated_at }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn price(&self) -> Decimal { self.price }
    pub fn status(&self) -> ProductStatus { self.status }
    pub fn variants(&self) -> &[Variant] { &self.variants }
    pub fn is_active(&self) -> bool { self.status == ProductStatus::Active }

    pub fn publish(&mut self) -> Result<(), ProductError> {
        if self.name.is_empty() { return Err(ProductError::MissingName); }
        self.status = ProductStatus::Active;
        self.touch();
        Ok(())
    }

    pub fn archive(&mut self) { self.status = ProductStatus::Archived; self.touch(); }

    pub fn add_variant(&mut self, name: impl Into<String>, price: Option<Decimal>, quantity: u32) -> Uuid {
        let id = Uuid::now_v7();
        self.variants.push(Variant { id, name: name.into(), price, quantity });
        self.touch();
        id
    }

    pub fn variant(&self, variant_id: Uuid) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }

    /// Price captured into a cart line for this product or one of its variants.
    pub fn unit_price(&self, variant_id: Option<Uuid>) -> Result<Decimal, ProductError> {
        match variant_id {
            None => Ok(self.price),
            Some(id) => self.variant(id).map(|v| v.price.unwrap_or(self.price)).ok_or(ProductError::VariantNotFound),
        }
    }

    pub fn stock_key(&self, variant_id: Option<Uuid>) -> StockKey { StockKey::for_line(self.id, variant_id) }

    /// Quantity on hand for a key owned by this product.
    pub fn on_hand(&self, key: StockKey) -> Option<u32> {
        match key {
            StockKey::Product(id) if id == self.id => Some(self.quantity),
            StockKey::Variant(id) => self.variant(id).map(|v| v.quantity),
            StockKey::Product(_) => None,
        }
    }

    pub fn add_inventory(&mut self, key: StockKey, qty: u32) -> Result<u32, ProductError> {
        let slot = self.slot_mut(key)?;
        *slot = slot.saturating_add(qty);
        let remaining = *slot;
        self.touch();
        Ok(remaining)
    }

    /// Decrement-if-available. Returns the quantity left on hand.
    pub fn remove_inventory(&mut self, key: StockKey, qty: u32) -> Result<u32, ProductError> {
        let slot = self.slot_mut(key)?;
        let available = *slot;
        *slot = available.checked_sub(qty).ok_or(ProductError::InsufficientInventory { available })?;
        let remaining = *slot;
        self.touch();
        Ok(remaining)
    }

    fn slot_mut(&mut self, key: StockKey) -> Result<&mut u32, ProductError> {
        match key {
            StockKey::Product(id) if id == self.id => Ok(&mut self.quantity),
            StockKey::Variant(id) => self.variants.iter_mut().find(|v| v.id == id).map(|v| &mut v.quantity).ok_or(ProductError::VariantNotFound),
            StockKey::Product(_) => Err(ProductError::NotThisProduct),
        }
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("missing name")]
    MissingName,
    #[error("variant not found")]
    VariantNotFound,
    #[error("stock key does not belong to this product")]
    NotThisProduct,
    #[error("insufficient inventory ({available} available)")]
    InsufficientInventory { available: u32 },
    #[error("unknown product status {0}")]
    UnknownStatus(String),
}
