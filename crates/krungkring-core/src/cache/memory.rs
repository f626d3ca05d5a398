use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::Product;

/// How long a snapshot is served without revalidation.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// A cached value with the time it was stored.
#[derive(Debug, Clone)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    /// `now - cached_at < ttl`. A timestamp in the future (clock skew)
    /// counts as fresh.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        (Utc::now() - self.cached_at)
            .to_std()
            .map(|age| age < ttl)
            .unwrap_or(true)
    }
}

type Snapshot<T> = RwLock<Option<CachedData<Arc<Vec<T>>>>>;

/// Last-known product and category lists, owned by one `DataService`.
///
/// Snapshots are shared as `Arc`s so repeated reads hand out the same
/// allocation.
///
/// Every invalidation bumps a generation counter. A fetch records the
/// generation it started under and publishes through `set_*_if`, which
/// refuses once a write has moved the generation on.
#[derive(Debug)]
pub struct MemoryCache {
    ttl: Duration,
    generation: AtomicU64,
    products: Snapshot<Product>,
    categories: Snapshot<String>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            generation: AtomicU64::new(0),
            products: RwLock::new(None),
            categories: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_fresh<T>(&self, cached: &CachedData<T>) -> bool {
        cached.is_fresh(self.ttl)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Retire every fetch started so far without dropping the snapshots.
    pub fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn products(&self) -> Option<CachedData<Arc<Vec<Product>>>> {
        self.products.read().await.clone()
    }

    pub async fn set_products(&self, products: Arc<Vec<Product>>) {
        *self.products.write().await = Some(CachedData::new(products));
    }

    /// Store `products` only if no invalidation happened since `generation`.
    pub async fn set_products_if(&self, generation: u64, products: Arc<Vec<Product>>) -> bool {
        let mut slot = self.products.write().await;
        if self.generation() != generation {
            return false;
        }
        *slot = Some(CachedData::new(products));
        true
    }

    pub async fn categories(&self) -> Option<CachedData<Arc<Vec<String>>>> {
        self.categories.read().await.clone()
    }

    pub async fn set_categories(&self, categories: Arc<Vec<String>>) {
        *self.categories.write().await = Some(CachedData::new(categories));
    }

    pub async fn set_categories_if(&self, generation: u64, categories: Arc<Vec<String>>) -> bool {
        let mut slot = self.categories.write().await;
        if self.generation() != generation {
            return false;
        }
        *slot = Some(CachedData::new(categories));
        true
    }

    /// Drop both snapshots so the next read fetches.
    pub async fn invalidate(&self) {
        self.bump_generation();
        *self.products.write().await = None;
        *self.categories.write().await = None;
    }
}
