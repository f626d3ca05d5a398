//! Shopping cart models.
//!
//! The cart lives on the client only. What gets persisted is the minimal
//! `StoredCartItem` list; full products are joined back in by `Cart::hydrate`.

use serde::{Deserialize, Serialize};

use super::Product;
use crate::utils::format_thb;

/// Persisted form of a cart line: product id and quantity, nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct StoredCartItem {
    pub id: String,
    pub quantity: u32,
}

/// A cart line joined with its current product.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub product: Product,
    pub quantity: u32,
}

impl CartLine {
    pub fn unit_price(&self) -> f64 {
        self.product.unit_price(self.quantity)
    }

    pub fn is_wholesale(&self) -> bool {
        self.quantity >= self.product.min_wholesale_qty
    }

    pub fn total(&self) -> f64 {
        self.unit_price() * f64::from(self.quantity)
    }
}

/// Customer details entered on the order page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CustomerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a cart from stored items, dropping ids that no longer exist.
    pub fn hydrate(items: &[StoredCartItem], products: &[Product]) -> Self {
        let lines = items
            .iter()
            .filter_map(|item| {
                products
                    .iter()
                    .find(|p| p.id == item.id)
                    .map(|p| CartLine {
                        product: p.clone(),
                        quantity: item.quantity.max(1),
                    })
            })
            .collect();
        Self { lines }
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Add one unit of `product`, creating the line if needed.
    pub fn add(&mut self, product: &Product) {
        match self.lines.iter_mut().find(|l| l.product.id == product.id) {
            Some(line) => line.quantity += 1,
            None => self.lines.push(CartLine {
                product: product.clone(),
                quantity: 1,
            }),
        }
    }

    /// Change a line's quantity by `delta`. Quantity never drops below one;
    /// use `remove` to drop a line.
    pub fn update_quantity(&mut self, id: &str, delta: i64) {
        if let Some(line) = self.lines.iter_mut().find(|l| l.product.id == id) {
            let next = (i64::from(line.quantity) + delta).clamp(1, i64::from(u32::MAX));
            line.quantity = u32::try_from(next).unwrap_or(1);
        }
    }

    pub fn set_quantity(&mut self, id: &str, quantity: u32) {
        if let Some(line) = self.lines.iter_mut().find(|l| l.product.id == id) {
            line.quantity = quantity.max(1);
        }
    }

    pub fn remove(&mut self, id: &str) {
        self.lines.retain(|l| l.product.id != id);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn total(&self) -> f64 {
        self.lines.iter().map(CartLine::total).sum()
    }

    pub fn to_stored(&self) -> Vec<StoredCartItem> {
        self.lines
            .iter()
            .map(|l| StoredCartItem {
                id: l.product.id.clone(),
                quantity: l.quantity,
            })
            .collect()
    }

    /// Plain-text order summary sent to the shop.
    pub fn order_summary(&self, customer: &CustomerInfo) -> String {
        let items = self
            .lines
            .iter()
            .map(|l| {
                format!(
                    "{} x{} = {}/unit",
                    l.product.name,
                    l.quantity,
                    format_thb(l.unit_price())
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Order\n{}\n\nTotal: {}\n\nCustomer\nName: {}\nPhone: {}\nAddress: {}\nNote: {}",
            items,
            format_thb(self.total()),
            customer.name,
            customer.phone,
            customer.address,
            customer.note
        )
    }
}
