//! Remote store adapters.
//!
//! Two independent databases hold the same `products` and `categories`
//! tables:
//!
//! - `PrimaryStore`: PostgreSQL, reached with a connection string
//! - `SecondaryStore`: a PostgREST table API, reached over HTTPS
//!
//! Both implement `RemoteStore`. `UnavailableStore` stands in for a backend
//! that is not configured.

pub mod error;
pub mod postgres;
pub mod rest;
pub mod schema;
pub mod store;

pub use error::StoreError;
pub use postgres::PrimaryStore;
pub use rest::SecondaryStore;
pub use store::{RemoteStore, UnavailableStore};
