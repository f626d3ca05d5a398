//! Cart and customer details persisted in the local store.

use anyhow::Result;
use serde_json::Value as Json;
use tracing::{debug, info};

use crate::cache::LocalStore;
use crate::models::{Cart, CustomerInfo, Product, StoredCartItem};

/// Current cart key: a list of `{id, quantity}`.
pub const CART_KEY: &str = "sunny_cart_v2";

/// Older cart key holding full product snapshots with a quantity.
pub const LEGACY_CART_KEY: &str = "sunny_cart";

pub const CUSTOMER_INFO_KEY: &str = "sunny_customer_info_v1";

/// Recover `{id, quantity}` from one legacy snapshot entry. The id may be
/// a string or a number; a missing quantity counts as one.
fn legacy_item(entry: &Json) -> Option<StoredCartItem> {
    let id = match entry.get("id")? {
        Json::String(id) if !id.is_empty() => id.clone(),
        Json::Number(id) => id.to_string(),
        _ => return None,
    };
    let quantity = match entry.get("quantity") {
        None | Some(Json::Null) => 1,
        Some(quantity) => u32::try_from(quantity.as_u64()?).ok()?,
    };
    (quantity > 0).then_some(StoredCartItem { id, quantity })
}

#[derive(Debug, Clone)]
pub struct CartStore {
    local: LocalStore,
}

impl CartStore {
    pub fn new(local: LocalStore) -> Self {
        Self { local }
    }

    /// Stored cart items. When the current cart is missing or unparsable
    /// the legacy cart is migrated instead.
    pub fn load(&self) -> Vec<StoredCartItem> {
        if let Some(raw) = self.local.get_raw(CART_KEY) {
            match serde_json::from_str::<Vec<StoredCartItem>>(&raw) {
                Ok(items) => return items.into_iter().filter(|i| i.quantity > 0).collect(),
                Err(e) => debug!(error = %e, "Unparsable cart, trying the legacy cart"),
            }
        }
        self.migrate_legacy()
    }

    /// Convert the legacy cart entry by entry, skipping entries that cannot
    /// be read. The legacy key is removed only once the converted cart is
    /// saved, and kept when none of its entries could be recovered.
    fn migrate_legacy(&self) -> Vec<StoredCartItem> {
        let Some(raw) = self.local.get_raw(LEGACY_CART_KEY) else {
            return Vec::new();
        };
        let entries = match serde_json::from_str::<Vec<Json>>(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(error = %e, "Unparsable legacy cart, leaving it in place");
                return Vec::new();
            }
        };
        let items: Vec<StoredCartItem> = entries.iter().filter_map(legacy_item).collect();
        if items.is_empty() && !entries.is_empty() {
            debug!(entries = entries.len(), "No legacy cart entry recovered, leaving it in place");
            return items;
        }

        match self.save(&items) {
            Ok(()) => {
                if let Err(e) = self.local.remove(LEGACY_CART_KEY) {
                    debug!(error = %e, "Failed to remove legacy cart");
                }
                info!(
                    items = items.len(),
                    skipped = entries.len() - items.len(),
                    "Migrated legacy cart"
                );
            }
            Err(e) => debug!(error = %e, "Failed to persist migrated cart, keeping legacy cart"),
        }
        items
    }

    pub fn save(&self, items: &[StoredCartItem]) -> Result<()> {
        self.local.set_raw(CART_KEY, &serde_json::to_string(items)?)
    }

    /// The stored cart joined with `products`. Items whose product no longer
    /// exists are dropped.
    pub fn load_cart(&self, products: &[Product]) -> Cart {
        Cart::hydrate(&self.load(), products)
    }

    pub fn save_cart(&self, cart: &Cart) -> Result<()> {
        self.save(&cart.to_stored())
    }

    /// Add one of `product_id` to the stored cart.
    pub fn add(&self, product_id: &str) -> Result<Vec<StoredCartItem>> {
        let mut items = self.load();
        match items.iter_mut().find(|i| i.id == product_id) {
            Some(item) => item.quantity += 1,
            None => items.push(StoredCartItem {
                id: product_id.to_string(),
                quantity: 1,
            }),
        }
        self.save(&items)?;
        Ok(items)
    }

    pub fn clear(&self) -> Result<()> {
        self.local.remove(CART_KEY)
    }

    pub fn load_customer(&self) -> CustomerInfo {
        self.local
            .get_raw(CUSTOMER_INFO_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn save_customer(&self, customer: &CustomerInfo) -> Result<()> {
        self.local
            .set_raw(CUSTOMER_INFO_KEY, &serde_json::to_string(customer)?)
    }
}
