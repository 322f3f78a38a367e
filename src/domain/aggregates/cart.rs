//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::services::pricing::PricedLine;
use crate::domain::value_objects::{Identity, Quantity, StockKey};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    id: Uuid,
    owner: Identity,
    lines: Vec<CartLine>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// One product (and optional variant) in a cart. `unit_price` is captured when the
/// line is first added; `product_name` is the live catalogue name.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: Quantity,
    pub unit_price: Decimal,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity.value()) }
    pub fn stock_key(&self) -> StockKey { StockKey::for_line(self.product_id, self.variant_id) }
}

impl PricedLine for CartLine {
    fn unit_price(&self) -> Decimal { self.unit_price }
    fn quantity(&self) -> Quantity { self.quantity }
}

impl Cart {
    pub fn new(owner: Identity) -> Self {
        let now = Utc::now();
        Self { id: Uuid::now_v7(), owner, lines: vec![], created_at: now, updated_at: now }
    }

    pub fn restore(id: Uuid, owner: Identity, lines: Vec<CartLine>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        Self { id, owner, lines, created_at, updated_at }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn owner(&self) -> &Identity { &self.owner }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn subtotal(&self) -> Decimal { self.lines.iter().map(CartLine::line_total).sum() }
    pub fn item_count(&self) -> u32 { self.lines.iter().map(|l| l.quantity.value()).sum() }

    pub fn line(&self, line_id: Uuid) -> Option<&CartLine> { self.lines.iter().find(|l| l.id == line_id) }

    pub fn find_line(&self, product_id: Uuid, variant_id: Option<Uuid>) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.product_id == product_id && l.variant_id == variant_id)
    }

    /// Adds a line, or merges the quantity into the existing line for the same
    /// product/variant pair. The merged line keeps its original captured price.
    pub fn add_line(&mut self, product_id: Uuid, variant_id: Option<Uuid>, product_name: impl Into<String>, quantity: Quantity, unit_price: Decimal) -> &CartLine {
        let index = match self.lines.iter().position(|l| l.product_id == product_id && l.variant_id == variant_id) {
            Some(index) => {
                let existing = &mut self.lines[index];
                existing.quantity = existing.quantity.add(quantity);
                index
            }
            None => {
                self.lines.push(CartLine { id: Uuid::now_v7(), product_id, variant_id, product_name: product_name.into(), quantity, unit_price });
                self.lines.len() - 1
            }
        };
        self.touch();
        &self.lines[index]
    }

    pub fn update_quantity(&mut self, line_id: Uuid, quantity: Quantity) -> Result<&CartLine, CartError> {
        let index = self.lines.iter().position(|l| l.id == line_id).ok_or(CartError::LineNotFound)?;
        self.lines[index].quantity = quantity;
        self.touch();
        Ok(&self.lines[index])
    }

    pub fn remove_line(&mut self, line_id: Uuid) -> Result<CartLine, CartError> {
        let index = self.lines.iter().position(|l| l.id == line_id).ok_or(CartError::LineNotFound)?;
        let removed = self.lines.remove(index);
        self.touch();
        Ok(removed)
    }

    pub fn clear(&mut self) { self.lines.clear(); self.touch(); }

    /// Total requested quantity per stock location. Two lines can only share a key
    /// if the data is inconsistent, but summing keeps the stock check honest anyway.
    pub fn requested_stock(&self) -> BTreeMap<StockKey, u32> {
        let mut requested = BTreeMap::new();
        for line in &self.lines {
            *requested.entry(line.stock_key()).or_insert(0u32) += line.quantity.value();
        }
        requested
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("cart line not found")]
    LineNotFound,
}
