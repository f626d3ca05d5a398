use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::models::{Product, ProductUpdate};

/// Key holding the product list.
pub const PRODUCTS_KEY: &str = "krungkring_products";

/// Key holding the category list.
pub const CATEGORIES_KEY: &str = "krungkring_categories";

/// Durable key/value store scoped to one storefront: a directory with one
/// JSON file per key.
///
/// Reads never fail. An absent or unparsable key reads as an empty
/// collection.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create local store directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Raw value stored under `key`, if any.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.key_path(key)).ok()
    }

    pub fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        std::fs::write(self.key_path(key), value)
            .with_context(|| format!("Failed to write local key: {}", key))
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key);
        if path.exists() {
            std::fs::remove_file(&path).with_context(|| format!("Failed to remove local key: {}", key))?;
        }
        Ok(())
    }

    fn load<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let Some(contents) = self.get_raw(key) else {
            return T::default();
        };
        match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(e) => {
                debug!(key, error = %e, "Unparsable local value, treating as empty");
                T::default()
            }
        }
    }

    fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let contents = serde_json::to_string(value)?;
        self.set_raw(key, &contents)
    }

    // ===== Products =====

    pub fn get_products(&self) -> Vec<Product> {
        self.load(PRODUCTS_KEY)
    }

    pub fn save_products(&self, products: &[Product]) -> Result<()> {
        self.save(PRODUCTS_KEY, products)
    }

    /// Append `product`, replacing any stored product with the same id.
    pub fn add_product(&self, product: &Product) -> Result<Product> {
        let mut products = self.get_products();
        products.retain(|p| p.id != product.id);
        products.push(product.clone());
        self.save_products(&products)?;
        Ok(product.clone())
    }

    pub fn delete_product(&self, id: &str) -> Result<()> {
        let mut products = self.get_products();
        products.retain(|p| p.id != id);
        self.save_products(&products)
    }

    pub fn update_product(&self, id: &str, update: &ProductUpdate) -> Result<()> {
        let mut products = self.get_products();
        for product in products.iter_mut().filter(|p| p.id == id) {
            update.apply_to(product);
        }
        self.save_products(&products)
    }

    // ===== Categories =====

    pub fn get_categories(&self) -> Vec<String> {
        self.load(CATEGORIES_KEY)
    }

    pub fn save_categories(&self, categories: &[String]) -> Result<()> {
        self.save(CATEGORIES_KEY, categories)
    }

    pub fn add_category(&self, name: &str) -> Result<Vec<String>> {
        let mut categories = self.get_categories();
        if !categories.iter().any(|c| c == name) {
            categories.push(name.to_string());
            self.save_categories(&categories)?;
        }
        Ok(categories)
    }

    pub fn delete_category(&self, name: &str) -> Result<Vec<String>> {
        let mut categories = self.get_categories();
        categories.retain(|c| c != name);
        self.save_categories(&categories)?;
        Ok(categories)
    }

    /// Rename a category and re-tag the products filed under it.
    pub fn rename_category(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let mut categories: Vec<String> = Vec::new();
        for category in self.get_categories() {
            let name = if category == from { to.to_string() } else { category };
            if !categories.contains(&name) {
                categories.push(name);
            }
        }
        self.save_categories(&categories)?;

        let mut products = self.get_products();
        let mut retagged = false;
        for product in products.iter_mut().filter(|p| p.in_category(from)) {
            product.category = Some(to.to_string());
            retagged = true;
        }
        if retagged {
            self.save_products(&products)?;
        }
        Ok(categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("store")).unwrap();
        (dir, store)
    }

    fn product(id: &str, category: Option<&str>) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            image: None,
            retail_price: 10.0,
            wholesale_price: 8.0,
            min_wholesale_qty: 5,
            weight: None,
            description: None,
            category: category.map(str::to_string),
            pinned: false,
            pinned_at: None,
        }
    }

    #[test]
    fn test_missing_keys_read_as_empty() {
        let (_dir, store) = store();
        assert!(store.get_products().is_empty());
        assert!(store.get_categories().is_empty());
    }

    #[test]
    fn test_unparsable_content_reads_as_empty() {
        let (_dir, store) = store();
        store.set_raw(PRODUCTS_KEY, "{not json").unwrap();
        store.set_raw(CATEGORIES_KEY, r#"{"an":"object"}"#).unwrap();
        assert!(store.get_products().is_empty());
        assert!(store.get_categories().is_empty());
    }

    #[test]
    fn test_products_use_camel_case_layout() {
        let (_dir, store) = store();
        store.save_products(&[product("1", None)]).unwrap();
        let raw = store.get_raw(PRODUCTS_KEY).unwrap();
        assert!(raw.contains("\"retailPrice\":10.0"));
        assert!(raw.contains("\"minWholesaleQty\":5"));
        assert_eq!(store.get_products(), vec![product("1", None)]);
    }

    #[test]
    fn test_product_mutations() {
        let (_dir, store) = store();
        store.add_product(&product("1", None)).unwrap();
        store.add_product(&product("2", None)).unwrap();
        store
            .update_product("2", &ProductUpdate::new().name("Renamed"))
            .unwrap();
        store.delete_product("1").unwrap();

        let products = store.get_products();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "Renamed");
    }

    #[test]
    fn test_add_category_ignores_duplicates() {
        let (_dir, store) = store();
        store.add_category("Fried").unwrap();
        let categories = store.add_category("Fried").unwrap();
        assert_eq!(categories, vec!["Fried".to_string()]);
        assert!(store.delete_category("Fried").unwrap().is_empty());
    }

    #[test]
    fn test_rename_category_retags_products() {
        let (_dir, store) = store();
        store.save_categories(&["Fried".to_string(), "Chicken".to_string()]).unwrap();
        store
            .save_products(&[product("1", Some("Fried")), product("2", Some("Chicken"))])
            .unwrap();

        let categories = store.rename_category("Fried", "Crispy").unwrap();

        assert_eq!(categories, vec!["Crispy".to_string(), "Chicken".to_string()]);
        let products = store.get_products();
        assert_eq!(products[0].category.as_deref(), Some("Crispy"));
        assert_eq!(products[1].category.as_deref(), Some("Chicken"));
    }

    #[test]
    fn test_remove_raw_key() {
        let (_dir, store) = store();
        store.set_raw("sunny_cart", "[]").unwrap();
        store.remove("sunny_cart").unwrap();
        assert!(store.get_raw("sunny_cart").is_none());
        // Removing an absent key is fine
        store.remove("sunny_cart").unwrap();
    }
}
