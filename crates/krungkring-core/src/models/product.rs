//! Product model and the draft/update types used by admin actions.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Last id handed out by `generate_product_id`, in epoch milliseconds.
static LAST_PRODUCT_ID: AtomicI64 = AtomicI64::new(0);

/// Generate a new product id.
///
/// Ids are epoch-millisecond strings (the format existing stores already
/// hold). Two ids generated within the same millisecond are bumped so the
/// sequence stays strictly increasing within a process.
pub fn generate_product_id() -> String {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_PRODUCT_ID.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_PRODUCT_ID.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return next.to_string(),
            Err(current) => last = current,
        }
    }
}

/// A catalog product.
///
/// Serialized camelCase, which is also the layout of the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub retail_price: f64,
    pub wholesale_price: f64,
    pub min_wholesale_qty: u32,
    /// Weight in kilograms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    /// Epoch milliseconds at which the product was pinned.
    #[serde(default)]
    pub pinned_at: Option<i64>,
}

impl Product {
    /// Unit price for the given quantity: wholesale at or above the
    /// wholesale threshold, retail below it.
    pub fn unit_price(&self, quantity: u32) -> f64 {
        if quantity >= self.min_wholesale_qty {
            self.wholesale_price
        } else {
            self.retail_price
        }
    }

    pub fn in_category(&self, category: &str) -> bool {
        self.category.as_deref() == Some(category)
    }
}

/// A product as entered in the admin form, before an id is assigned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ProductDraft {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub retail_price: f64,
    pub wholesale_price: f64,
    pub min_wholesale_qty: u32,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub pinned_at: Option<i64>,
}

impl ProductDraft {
    pub fn into_product(self, id: String) -> Product {
        Product {
            id,
            name: self.name,
            image: self.image,
            retail_price: self.retail_price,
            wholesale_price: self.wholesale_price,
            min_wholesale_qty: self.min_wholesale_qty.max(1),
            weight: self.weight,
            description: self.description,
            category: self.category,
            pinned: self.pinned,
            pinned_at: self.pinned_at,
        }
    }
}

/// A partial product update. `None` leaves a field untouched.
///
/// Nullable fields use `Option<Option<_>>`: `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub image: Option<Option<String>>,
    pub retail_price: Option<f64>,
    pub wholesale_price: Option<f64>,
    pub min_wholesale_qty: Option<u32>,
    pub weight: Option<Option<f64>>,
    pub description: Option<Option<String>>,
    pub category: Option<Option<String>>,
    pub pinned: Option<bool>,
    pub pinned_at: Option<Option<i64>>,
}

impl ProductUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn image(mut self, image: Option<String>) -> Self {
        self.image = Some(image);
        self
    }

    pub fn prices(mut self, retail: f64, wholesale: f64) -> Self {
        self.retail_price = Some(retail);
        self.wholesale_price = Some(wholesale);
        self
    }

    pub fn min_wholesale_qty(mut self, qty: u32) -> Self {
        self.min_wholesale_qty = Some(qty);
        self
    }

    pub fn weight(mut self, weight: Option<f64>) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn category(mut self, category: Option<String>) -> Self {
        self.category = Some(category);
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = Some(pinned);
        self
    }

    pub fn pinned_at(mut self, pinned_at: Option<i64>) -> Self {
        self.pinned_at = Some(pinned_at);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Make the pin timestamp agree with the pin flag.
    ///
    /// Unpinning always clears `pinned_at`. Pinning without a timestamp
    /// stamps the current time. A timestamp sent without the flag is dropped,
    /// since the stored product may not be pinned.
    pub fn normalized(mut self) -> Self {
        match self.pinned {
            Some(false) => self.pinned_at = Some(None),
            Some(true) if self.pinned_at.flatten().is_none() => {
                self.pinned_at = Some(Some(Utc::now().timestamp_millis()));
            }
            Some(true) => {}
            None => {
                if matches!(self.pinned_at, Some(Some(_))) {
                    self.pinned_at = None;
                }
            }
        }
        self
    }

    /// Apply the supplied fields to `product`.
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(ref name) = self.name {
            product.name = name.clone();
        }
        if let Some(ref image) = self.image {
            product.image = image.clone();
        }
        if let Some(price) = self.retail_price {
            product.retail_price = price;
        }
        if let Some(price) = self.wholesale_price {
            product.wholesale_price = price;
        }
        if let Some(qty) = self.min_wholesale_qty {
            product.min_wholesale_qty = qty.max(1);
        }
        if let Some(weight) = self.weight {
            product.weight = weight;
        }
        if let Some(ref description) = self.description {
            product.description = description.clone();
        }
        if let Some(ref category) = self.category {
            product.category = category.clone();
        }
        if let Some(pinned) = self.pinned {
            product.pinned = pinned;
        }
        if let Some(pinned_at) = self.pinned_at {
            product.pinned_at = pinned_at;
        }
    }
}
