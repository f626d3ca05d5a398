//! Data access layer for the Krungkring storefront.
//!
//! Products and categories live in two remote stores (PostgreSQL and a
//! PostgREST table API) with a local JSON store as the offline fallback.
//! `DataService` ties them together behind a short-lived memory cache.

pub mod api;
pub mod cache;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod models;
pub mod service;
pub mod sync;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use service::{DataError, DataService};
