//! Local persistence and in-memory caching.
//!
//! - `LocalStore` keeps the product and category lists (and the cart) on
//!   disk as one JSON file per key. It is the last tier of every read.
//! - `MemoryCache` holds short-lived snapshots of the remote lists.

pub mod local;
pub mod memory;

pub use local::{LocalStore, CATEGORIES_KEY, PRODUCTS_KEY};
pub use memory::{CachedData, MemoryCache, DEFAULT_TTL};
