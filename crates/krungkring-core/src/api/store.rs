use async_trait::async_trait;

use super::StoreError;
use crate::models::{Product, ProductUpdate};

/// A remote database holding the `products` and `categories` tables.
///
/// Both backends expose the same logical operations; which columns they
/// actually have may differ, so writes fall back to a reduced column list on
/// `StoreError::UnknownColumn` (see `schema::ProductPayload::reduced_for`).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Create tables if the backend supports it.
    async fn initialize(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// All products, newest first by creation time.
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    /// All category names, ordered by name.
    async fn list_categories(&self) -> Result<Vec<String>, StoreError>;

    /// Insert a product under its client-supplied id.
    async fn insert_product(&self, product: &Product) -> Result<Product, StoreError>;

    async fn delete_product(&self, id: &str) -> Result<(), StoreError>;

    /// Change only the fields the update supplies.
    async fn update_product(&self, id: &str, update: &ProductUpdate) -> Result<(), StoreError>;

    /// Delete every product, then insert `products`.
    async fn replace_products(&self, products: &[Product]) -> Result<(), StoreError>;

    /// Insert or overwrite products keyed by id. Pin state and weight are
    /// not copied, so an existing row keeps its own.
    async fn upsert_products(&self, products: &[Product]) -> Result<(), StoreError>;

    /// Insert a category and return the updated category list.
    async fn insert_category(&self, name: &str) -> Result<Vec<String>, StoreError>;

    /// Insert categories that do not exist yet, keyed by name.
    async fn upsert_categories(&self, names: &[String]) -> Result<(), StoreError>;

    /// Delete a category and return the updated category list.
    async fn delete_category(&self, name: &str) -> Result<Vec<String>, StoreError>;

    /// Rename a category, re-tagging its products, and return the updated
    /// category list.
    async fn rename_category(&self, from: &str, to: &str) -> Result<Vec<String>, StoreError>;
}

/// Stand-in for a backend with no connection configured. Every call fails
/// with `StoreError::NotConfigured`, so the data service falls through to
/// the next tier.
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    name: &'static str,
}

impl UnavailableStore {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }

    fn err(&self) -> StoreError {
        StoreError::NotConfigured(self.name)
    }
}

#[async_trait]
impl RemoteStore for UnavailableStore {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        Err(self.err())
    }

    async fn list_categories(&self) -> Result<Vec<String>, StoreError> {
        Err(self.err())
    }

    async fn insert_product(&self, _product: &Product) -> Result<Product, StoreError> {
        Err(self.err())
    }

    async fn delete_product(&self, _id: &str) -> Result<(), StoreError> {
        Err(self.err())
    }

    async fn update_product(&self, _id: &str, _update: &ProductUpdate) -> Result<(), StoreError> {
        Err(self.err())
    }

    async fn replace_products(&self, _products: &[Product]) -> Result<(), StoreError> {
        Err(self.err())
    }

    async fn upsert_products(&self, _products: &[Product]) -> Result<(), StoreError> {
        Err(self.err())
    }

    async fn insert_category(&self, _name: &str) -> Result<Vec<String>, StoreError> {
        Err(self.err())
    }

    async fn upsert_categories(&self, _names: &[String]) -> Result<(), StoreError> {
        Err(self.err())
    }

    async fn delete_category(&self, _name: &str) -> Result<Vec<String>, StoreError> {
        Err(self.err())
    }

    async fn rename_category(&self, _from: &str, _to: &str) -> Result<Vec<String>, StoreError> {
        Err(self.err())
    }
}
