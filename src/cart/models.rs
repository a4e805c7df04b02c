//! Catalogue, cart and ticket models

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub title: String,
    pub description: String,
    pub code: String,
    pub price_cents: i64,
    pub stock: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub code: String,
    pub price_cents: i64,
    pub stock: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartItem {
    pub product: Product,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cart {
    pub id: String,
    pub owner_id: String,
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn quantity_of(&self, product_id: &str) -> Option<i64> {
        self.items
            .iter()
            .find(|item| item.product.id == product_id)
            .map(|item| item.quantity)
    }
}

/// Receipt of a completed purchase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ticket {
    pub id: String,
    pub code: String,
    pub purchase_datetime: String,
    pub amount_cents: i64,
    pub purchaser: String,
}

/// What a purchase bought and what it left behind
#[derive(Debug, Clone, Serialize)]
pub struct Purchase {
    pub ticket: Option<Ticket>,
    pub unavailable: Vec<String>,
}

/// API request types
#[derive(Debug, Clone, Deserialize)]
pub struct ItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: i64,
}
