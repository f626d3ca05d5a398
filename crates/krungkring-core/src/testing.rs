//! In-memory `RemoteStore` for exercising the data service and sync job.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::api::{RemoteStore, StoreError};
use crate::models::{Product, ProductUpdate};

pub(crate) struct FakeStore {
    name: &'static str,
    products: Mutex<Vec<Product>>,
    categories: Mutex<Vec<String>>,
    failing: AtomicBool,
    failing_reads: AtomicUsize,
    read_delay: Mutex<Option<Duration>>,
    list_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl FakeStore {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            products: Mutex::new(Vec::new()),
            categories: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            failing_reads: AtomicUsize::new(0),
            read_delay: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
        })
    }

    pub fn down(name: &'static str) -> Arc<Self> {
        let store = Self::new(name);
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail the next `n` list calls, then behave normally.
    pub fn fail_next_reads(&self, n: usize) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    /// Delay list calls. Rows are read when the call starts, like a
    /// database snapshot, and returned after the delay.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_products(&self, products: Vec<Product>) {
        *self.products.lock().unwrap() = products;
    }

    pub fn set_categories(&self, categories: Vec<String>) {
        *self.categories.lock().unwrap() = categories;
    }

    pub fn products(&self) -> Vec<Product> {
        self.products.lock().unwrap().clone()
    }

    pub fn categories(&self) -> Vec<String> {
        self.categories.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, reading: bool) -> Result<(), StoreError> {
        if reading {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
        } else {
            self.write_calls.fetch_add(1, Ordering::SeqCst);
        }
        let delay = *self.read_delay.lock().unwrap();
        if let (true, Some(delay)) = (reading, delay) {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::ServerError(format!("{} is down", self.name)));
        }
        if reading
            && self
                .failing_reads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(StoreError::ServerError(format!("{} read failed", self.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let snapshot = self.products();
        self.enter(true).await?;
        Ok(snapshot)
    }

    async fn list_categories(&self) -> Result<Vec<String>, StoreError> {
        let snapshot = self.categories();
        self.enter(true).await?;
        Ok(snapshot)
    }

    async fn insert_product(&self, product: &Product) -> Result<Product, StoreError> {
        self.enter(false).await?;
        self.products.lock().unwrap().insert(0, product.clone());
        Ok(product.clone())
    }

    async fn delete_product(&self, id: &str) -> Result<(), StoreError> {
        self.enter(false).await?;
        self.products.lock().unwrap().retain(|p| p.id != id);
        Ok(())
    }

    async fn update_product(&self, id: &str, update: &ProductUpdate) -> Result<(), StoreError> {
        self.enter(false).await?;
        for product in self.products.lock().unwrap().iter_mut().filter(|p| p.id == id) {
            update.apply_to(product);
        }
        Ok(())
    }

    async fn replace_products(&self, products: &[Product]) -> Result<(), StoreError> {
        self.enter(false).await?;
        self.set_products(products.to_vec());
        Ok(())
    }

    /// Weight and pin state stay with the stored row.
    async fn upsert_products(&self, products: &[Product]) -> Result<(), StoreError> {
        self.enter(false).await?;
        let mut stored = self.products.lock().unwrap();
        for product in products {
            match stored.iter_mut().find(|p| p.id == product.id) {
                Some(existing) => {
                    *existing = Product {
                        weight: existing.weight,
                        pinned: existing.pinned,
                        pinned_at: existing.pinned_at,
                        ..product.clone()
                    };
                }
                None => stored.push(Product {
                    weight: None,
                    pinned: false,
                    pinned_at: None,
                    ..product.clone()
                }),
            }
        }
        Ok(())
    }

    async fn insert_category(&self, name: &str) -> Result<Vec<String>, StoreError> {
        self.enter(false).await?;
        let mut categories = self.categories.lock().unwrap();
        categories.push(name.to_string());
        categories.sort();
        Ok(categories.clone())
    }

    async fn upsert_categories(&self, names: &[String]) -> Result<(), StoreError> {
        self.enter(false).await?;
        let mut categories = self.categories.lock().unwrap();
        for name in names {
            if !categories.contains(name) {
                categories.push(name.clone());
            }
        }
        categories.sort();
        Ok(())
    }

    async fn delete_category(&self, name: &str) -> Result<Vec<String>, StoreError> {
        self.enter(false).await?;
        let mut categories = self.categories.lock().unwrap();
        categories.retain(|c| c != name);
        Ok(categories.clone())
    }

    async fn rename_category(&self, from: &str, to: &str) -> Result<Vec<String>, StoreError> {
        self.enter(false).await?;
        for product in self.products.lock().unwrap().iter_mut().filter(|p| p.in_category(from)) {
            product.category = Some(to.to_string());
        }
        let mut categories = self.categories.lock().unwrap();
        for category in categories.iter_mut().filter(|c| *c == from) {
            *category = to.to_string();
        }
        categories.sort();
        Ok(categories.clone())
    }
}

/// A product with the given id and otherwise plain values.
pub(crate) fn sample_product(id: &str) -> Product {
    Product {
        id: id.to_string(),
        name: format!("Product {}", id),
        image: None,
        retail_price: 59.0,
        wholesale_price: 45.0,
        min_wholesale_qty: 10,
        weight: None,
        description: None,
        category: Some("Snacks".to_string()),
        pinned: false,
        pinned_at: None,
    }
}
