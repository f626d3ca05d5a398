//! Data models for the storefront.
//!
//! - `Product`, `ProductDraft`, `ProductUpdate`: catalog entries and the
//!   admin create/update inputs
//! - `Cart`, `CartLine`, `StoredCartItem`, `CustomerInfo`: client-side cart

pub mod cart;
pub mod product;

pub use cart::{Cart, CartLine, CustomerInfo, StoredCartItem};
pub use product::{generate_product_id, Product, ProductDraft, ProductUpdate};

/// A category is just its name, unique within the category set.
pub type Category = String;
