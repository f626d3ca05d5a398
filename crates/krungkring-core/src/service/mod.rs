//! The storefront's data access layer.
//!
//! `DataService` answers reads from a short-lived memory snapshot, falling
//! back from the secondary remote to the primary remote to the local store,
//! and sends writes to both remotes according to `WriteOp::policy`.

pub mod policy;

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{PrimaryStore, RemoteStore, SecondaryStore, StoreError, UnavailableStore};
use crate::cache::{LocalStore, MemoryCache};
use crate::config::Config;
use crate::models::{generate_product_id, Product, ProductDraft, ProductUpdate};

pub use policy::{FanOut, Settled, WriteOp, WritePolicy};

/// Default budget for a single remote read.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// Attempts per remote tier for the DB-only reads.
const DB_ONLY_ATTEMPTS: usize = 2;

#[derive(Error, Debug)]
pub enum DataError {
    /// The secondary store rejected a write it is authoritative for.
    #[error("{op} was rejected by the secondary store: {source}")]
    AuthoritativeWrite {
        op: WriteOp,
        #[source]
        source: StoreError,
    },
}

struct Inner {
    primary: Arc<dyn RemoteStore>,
    secondary: Arc<dyn RemoteStore>,
    local: LocalStore,
    cache: MemoryCache,
    remote_timeout: Duration,
    /// Serialises local writes against fetches mirroring into the local store.
    local_guard: Mutex<()>,
}

/// Clone is cheap and every clone shares one cache.
#[derive(Clone)]
pub struct DataService {
    inner: Arc<Inner>,
}

impl DataService {
    pub fn new(
        primary: Arc<dyn RemoteStore>,
        secondary: Arc<dyn RemoteStore>,
        local: LocalStore,
        cache: MemoryCache,
        remote_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                primary,
                secondary,
                local,
                cache,
                remote_timeout,
                local_guard: Mutex::new(()),
            }),
        }
    }

    /// Build the service from configuration. A remote with no connection
    /// settings is replaced by an `UnavailableStore`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let primary: Arc<dyn RemoteStore> = match config.database_url.as_deref() {
            Some(url) => Arc::new(PrimaryStore::connect_lazy(url)?),
            None => {
                info!("No primary database configured");
                Arc::new(UnavailableStore::new("primary"))
            }
        };
        let secondary: Arc<dyn RemoteStore> =
            match (config.secondary_url.as_deref(), config.secondary_key.as_deref()) {
                (Some(url), Some(key)) => Arc::new(SecondaryStore::new(url, key)?),
                _ => {
                    info!("No secondary store configured");
                    Arc::new(UnavailableStore::new("secondary"))
                }
            };
        let local = LocalStore::new(config.data_dir()?)?;

        Ok(Self::new(
            primary,
            secondary,
            local,
            MemoryCache::new(config.cache_ttl()),
            config.remote_timeout(),
        ))
    }

    pub fn local(&self) -> &LocalStore {
        &self.inner.local
    }

    pub fn cache(&self) -> &MemoryCache {
        &self.inner.cache
    }

    /// Create the primary store's tables. Failures are logged, not returned.
    pub async fn initialize(&self) {
        match self.inner.primary.initialize().await {
            Ok(()) => info!(store = self.inner.primary.name(), "Store initialized"),
            Err(e) => warn!(store = self.inner.primary.name(), error = %e, "Failed to initialize store"),
        }
    }

    /// Run `call` against `store` with the remote timeout.
    ///
    /// The call is spawned, so when the timer wins the call keeps running
    /// in the background and its result is dropped.
    async fn bounded<T, F, Fut>(&self, store: &Arc<dyn RemoteStore>, call: F) -> Result<T, StoreError>
    where
        F: FnOnce(Arc<dyn RemoteStore>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::spawn(call(Arc::clone(store)));
        match tokio::time::timeout(self.inner.remote_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(StoreError::Aborted(e.to_string())),
            Err(_) => Err(StoreError::Timeout(self.inner.remote_timeout)),
        }
    }

    /// First remote answer in tier order, each tier tried `attempts` times.
    async fn first_remote<T, F, Fut>(&self, what: &'static str, attempts: usize, call: F) -> Option<T>
    where
        F: Fn(Arc<dyn RemoteStore>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
        T: Send + 'static,
    {
        for store in [&self.inner.secondary, &self.inner.primary] {
            for attempt in 1..=attempts {
                match self.bounded(store, &call).await {
                    Ok(value) => return Some(value),
                    Err(e) => {
                        warn!(store = store.name(), what, attempt, error = %e, "Remote read failed")
                    }
                }
            }
        }
        None
    }

    // ===== Reads =====

    /// Mirror a fetch into the local store unless a write landed after the
    /// fetch started at `generation`.
    fn mirror_local(&self, generation: u64, save: impl FnOnce(&LocalStore) -> Result<()>) -> bool {
        let _guard = self.inner.local_guard.lock().unwrap_or_else(PoisonError::into_inner);
        if self.inner.cache.generation() != generation {
            return false;
        }
        if let Err(e) = save(&self.inner.local) {
            warn!(error = %e, "Failed to mirror remote data locally");
        }
        true
    }

    /// Products from the fallback chain, bypassing the memory cache.
    ///
    /// A fetch overtaken by a write still returns what it read, but neither
    /// the local store nor the cache sees it.
    async fn fetch_products(&self, attempts: usize) -> Arc<Vec<Product>> {
        let generation = self.inner.cache.generation();
        let products = match self
            .first_remote("products", attempts, |store| async move { store.list_products().await })
            .await
        {
            Some(products) => {
                if !self.mirror_local(generation, |local| local.save_products(&products)) {
                    debug!("Products fetch overtaken by a write, discarding");
                    return Arc::new(products);
                }
                products
            }
            None => {
                debug!("Reading products from the local store");
                self.inner.local.get_products()
            }
        };
        let products = Arc::new(products);
        self.inner
            .cache
            .set_products_if(generation, Arc::clone(&products))
            .await;
        products
    }

    async fn fetch_categories(&self, attempts: usize) -> Arc<Vec<String>> {
        let generation = self.inner.cache.generation();
        let categories = match self
            .first_remote("categories", attempts, |store| async move {
                store.list_categories().await
            })
            .await
        {
            Some(categories) => {
                if !self.mirror_local(generation, |local| local.save_categories(&categories)) {
                    debug!("Categories fetch overtaken by a write, discarding");
                    return Arc::new(categories);
                }
                categories
            }
            None => {
                debug!("Reading categories from the local store");
                self.inner.local.get_categories()
            }
        };
        let categories = Arc::new(categories);
        self.inner
            .cache
            .set_categories_if(generation, Arc::clone(&categories))
            .await;
        categories
    }

    /// All products. A cached snapshot is returned as is; a stale one also
    /// schedules a background refresh.
    pub async fn get_products(&self) -> Arc<Vec<Product>> {
        if let Some(cached) = self.inner.cache.products().await {
            if !self.inner.cache.is_fresh(&cached) {
                let service = self.clone();
                tokio::spawn(async move {
                    service.fetch_products(1).await;
                });
            }
            return cached.data;
        }
        self.fetch_products(1).await
    }

    pub async fn get_categories(&self) -> Arc<Vec<String>> {
        if let Some(cached) = self.inner.cache.categories().await {
            if !self.inner.cache.is_fresh(&cached) {
                let service = self.clone();
                tokio::spawn(async move {
                    service.fetch_categories(1).await;
                });
            }
            return cached.data;
        }
        self.fetch_categories(1).await
    }

    /// Products for first load: never answered from the memory cache, and
    /// each remote is retried once before falling through.
    pub async fn get_products_from_db(&self) -> Arc<Vec<Product>> {
        self.fetch_products(DB_ONLY_ATTEMPTS).await
    }

    pub async fn get_categories_from_db(&self) -> Arc<Vec<String>> {
        self.fetch_categories(DB_ONLY_ATTEMPTS).await
    }

    // ===== Writes =====

    async fn fan_out<T, S, P>(&self, op: WriteOp, secondary: S, primary: P) -> FanOut<T>
    where
        S: Future<Output = Result<T, StoreError>>,
        P: Future<Output = Result<T, StoreError>>,
    {
        let (secondary, primary) = futures::join!(secondary, primary);
        let outcome = FanOut::new(secondary, primary);
        outcome.log_failures(op);
        outcome
    }

    async fn invalidate(&self) {
        self.inner.cache.invalidate().await;
    }

    /// Apply a local write and retire every fetch started before it, so none
    /// of them can mirror older data over it.
    fn write_local<T>(&self, write: impl FnOnce(&LocalStore) -> Result<T>) -> Result<T> {
        let _guard = self.inner.local_guard.lock().unwrap_or_else(PoisonError::into_inner);
        let result = write(&self.inner.local);
        self.inner.cache.bump_generation();
        result
    }

    fn log_local(op: WriteOp, result: Result<impl Sized>) {
        if let Err(e) = result {
            warn!(%op, error = %e, "Local write failed");
        }
    }

    /// Replace the whole product list everywhere.
    pub async fn save_products(&self, products: &[Product]) {
        let op = WriteOp::SaveProducts;
        let (secondary, primary) = (&self.inner.secondary, &self.inner.primary);
        self.fan_out(op, secondary.replace_products(products), primary.replace_products(products))
            .await;
        Self::log_local(op, self.write_local(|local| local.save_products(products)));
        self.invalidate().await;
    }

    /// Create a product. The id is generated here so every tier stores the
    /// same one.
    pub async fn add_product(&self, draft: ProductDraft) -> Product {
        let op = WriteOp::AddProduct;
        let product = draft.into_product(generate_product_id());
        let (secondary, primary) = (&self.inner.secondary, &self.inner.primary);
        let outcome = self
            .fan_out(op, secondary.insert_product(&product), primary.insert_product(&product))
            .await;

        let added = match outcome.settle(op.policy()) {
            Settled::Remote(added) => added,
            Settled::Local | Settled::Failed(_) => {
                info!(id = %product.id, "No remote accepted the product, keeping it locally");
                product
            }
        };
        Self::log_local(op, self.write_local(|local| local.add_product(&added)));
        self.invalidate().await;
        added
    }

    pub async fn delete_product(&self, id: &str) {
        let op = WriteOp::DeleteProduct;
        let (secondary, primary) = (&self.inner.secondary, &self.inner.primary);
        self.fan_out(op, secondary.delete_product(id), primary.delete_product(id))
            .await;
        Self::log_local(op, self.write_local(|local| local.delete_product(id)));
        self.invalidate().await;
    }

    /// Apply a partial update. Fails only when the secondary store rejects
    /// it, in which case nothing is written locally.
    pub async fn update_product(&self, id: &str, update: ProductUpdate) -> Result<(), DataError> {
        let op = WriteOp::UpdateProduct;
        let update = update.normalized();
        let (secondary, primary) = (&self.inner.secondary, &self.inner.primary);
        let outcome = self
            .fan_out(op, secondary.update_product(id, &update), primary.update_product(id, &update))
            .await;

        match outcome.settle(op.policy()) {
            Settled::Failed(source) => Err(DataError::AuthoritativeWrite { op, source }),
            Settled::Remote(()) | Settled::Local => {
                Self::log_local(op, self.write_local(|local| local.update_product(id, &update)));
                self.invalidate().await;
                Ok(())
            }
        }
    }

    /// Settle an any-remote category write: the remote's list when one
    /// succeeded, the local result otherwise.
    async fn settle_categories(
        &self,
        op: WriteOp,
        outcome: FanOut<Vec<String>>,
        local: Result<Vec<String>>,
    ) -> Vec<String> {
        let categories = match outcome.settle(op.policy()) {
            Settled::Remote(categories) => {
                Self::log_local(op, local);
                categories
            }
            Settled::Local | Settled::Failed(_) => local.unwrap_or_else(|e| {
                warn!(%op, error = %e, "Local write failed");
                self.inner.local.get_categories()
            }),
        };
        self.invalidate().await;
        categories
    }

    pub async fn add_category(&self, name: &str) -> Vec<String> {
        let op = WriteOp::AddCategory;
        let (secondary, primary) = (&self.inner.secondary, &self.inner.primary);
        let outcome = self
            .fan_out(op, secondary.insert_category(name), primary.insert_category(name))
            .await;
        let local = self.write_local(|local| local.add_category(name));
        self.settle_categories(op, outcome, local).await
    }

    pub async fn delete_category(&self, name: &str) -> Vec<String> {
        let op = WriteOp::DeleteCategory;
        let (secondary, primary) = (&self.inner.secondary, &self.inner.primary);
        let outcome = self
            .fan_out(op, secondary.delete_category(name), primary.delete_category(name))
            .await;
        let local = self.write_local(|local| local.delete_category(name));
        self.settle_categories(op, outcome, local).await
    }

    /// Rename a category and move its products along with it.
    pub async fn rename_category(&self, from: &str, to: &str) -> Vec<String> {
        let op = WriteOp::RenameCategory;
        let (secondary, primary) = (&self.inner.secondary, &self.inner.primary);
        let outcome = self
            .fan_out(op, secondary.rename_category(from, to), primary.rename_category(from, to))
            .await;
        let local = self.write_local(|local| local.rename_category(from, to));
        self.settle_categories(op, outcome, local).await
    }
}
