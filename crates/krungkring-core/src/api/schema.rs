//! Table columns, row decoding, and write payloads shared by both remote
//! stores.
//!
//! Writes are built as an explicit column list so that an adapter can drop
//! a column the backend does not know and retry once with the rest.

use std::future::Future;

use serde::Deserialize;
use serde_json::{Map, Value as Json};
use tracing::warn;

use super::StoreError;
use crate::models::{Product, ProductUpdate};

/// Columns of the `products` table that writes may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Id,
    Name,
    Image,
    RetailPrice,
    WholesalePrice,
    MinWholesaleQty,
    WeightKg,
    Description,
    Category,
    Pinned,
    PinnedAt,
}

impl Column {
    pub const ALL: [Column; 11] = [
        Column::Id,
        Column::Name,
        Column::Image,
        Column::RetailPrice,
        Column::WholesalePrice,
        Column::MinWholesaleQty,
        Column::WeightKg,
        Column::Description,
        Column::Category,
        Column::Pinned,
        Column::PinnedAt,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Name => "name",
            Column::Image => "image",
            Column::RetailPrice => "retail_price",
            Column::WholesalePrice => "wholesale_price",
            Column::MinWholesaleQty => "min_wholesale_qty",
            Column::WeightKg => "weight_kg",
            Column::Description => "description",
            Column::Category => "category",
            Column::Pinned => "pinned",
            Column::PinnedAt => "pinned_at",
        }
    }

    /// Columns not every backend is guaranteed to have.
    pub const fn is_optional(self) -> bool {
        matches!(self, Column::WeightKg | Column::Pinned | Column::PinnedAt)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// A single column value in a write.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(Option<String>),
    Float(Option<f64>),
    Int(i64),
    Bool(bool),
    /// Epoch milliseconds.
    Millis(Option<i64>),
}

impl Value {
    pub fn to_json(&self) -> Json {
        match self {
            Value::Text(v) => v.clone().map_or(Json::Null, Json::String),
            Value::Float(v) => v.map_or(Json::Null, Json::from),
            Value::Int(v) => Json::from(*v),
            Value::Bool(v) => Json::Bool(*v),
            Value::Millis(v) => v.map_or(Json::Null, Json::from),
        }
    }
}

/// Ordered column/value list for an insert or partial update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProductPayload {
    fields: Vec<(Column, Value)>,
}

impl ProductPayload {
    /// Full row for inserting `product`. `weight_kg` is only sent when the
    /// product has a weight.
    pub fn insert(product: &Product) -> Self {
        let mut fields = vec![
            (Column::Id, Value::Text(Some(product.id.clone()))),
            (Column::Name, Value::Text(Some(product.name.clone()))),
            (Column::Image, Value::Text(product.image.clone())),
            (Column::RetailPrice, Value::Float(Some(product.retail_price))),
            (Column::WholesalePrice, Value::Float(Some(product.wholesale_price))),
            (Column::MinWholesaleQty, Value::Int(i64::from(product.min_wholesale_qty))),
            (Column::Description, Value::Text(product.description.clone())),
            (Column::Category, Value::Text(product.category.clone())),
            (Column::Pinned, Value::Bool(product.pinned)),
            (Column::PinnedAt, Value::Millis(product.pinned_at)),
        ];
        if product.weight.is_some() {
            fields.push((Column::WeightKg, Value::Float(product.weight)));
        }
        Self { fields }
    }

    /// Row for copying `product` between stores. Pin state and weight stay
    /// with the target, so a stale source cannot overwrite them.
    pub fn sync(product: &Product) -> Self {
        Self::insert(product).without(&[Column::WeightKg, Column::Pinned, Column::PinnedAt])
    }

    /// Only the columns the update supplies.
    pub fn update(update: &ProductUpdate) -> Self {
        let mut fields = Vec::new();
        if let Some(ref name) = update.name {
            fields.push((Column::Name, Value::Text(Some(name.clone()))));
        }
        if let Some(ref image) = update.image {
            fields.push((Column::Image, Value::Text(image.clone())));
        }
        if let Some(price) = update.retail_price {
            fields.push((Column::RetailPrice, Value::Float(Some(price))));
        }
        if let Some(price) = update.wholesale_price {
            fields.push((Column::WholesalePrice, Value::Float(Some(price))));
        }
        if let Some(qty) = update.min_wholesale_qty {
            fields.push((Column::MinWholesaleQty, Value::Int(i64::from(qty.max(1)))));
        }
        if let Some(weight) = update.weight {
            fields.push((Column::WeightKg, Value::Float(weight)));
        }
        if let Some(ref description) = update.description {
            fields.push((Column::Description, Value::Text(description.clone())));
        }
        if let Some(ref category) = update.category {
            fields.push((Column::Category, Value::Text(category.clone())));
        }
        if let Some(pinned) = update.pinned {
            fields.push((Column::Pinned, Value::Bool(pinned)));
        }
        if let Some(pinned_at) = update.pinned_at {
            fields.push((Column::PinnedAt, Value::Millis(pinned_at)));
        }
        Self { fields }
    }

    pub fn fields(&self) -> &[(Column, Value)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, column: Column) -> bool {
        self.fields.iter().any(|(c, _)| *c == column)
    }

    pub fn without(&self, drop: &[Column]) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .filter(|(c, _)| !drop.contains(c))
                .cloned()
                .collect(),
        }
    }

    /// The payload to retry with after `err`, if any.
    ///
    /// A named optional column is dropped on its own; an unnamed mismatch
    /// drops every optional column. Returns `None` when the error is not a
    /// schema mismatch or nothing droppable is left, so callers retry at
    /// most once.
    pub fn reduced_for(&self, err: &StoreError) -> Option<Self> {
        if !err.is_schema_mismatch() {
            return None;
        }
        let drop: Vec<Column> = match err.unknown_column() {
            Some(name) => match Column::from_name(name) {
                Some(column) if column.is_optional() => vec![column],
                _ => return None,
            },
            None => Column::ALL.into_iter().filter(|c| c.is_optional()).collect(),
        };
        if !drop.iter().any(|c| self.contains(*c)) {
            return None;
        }
        Some(self.without(&drop))
    }

    pub fn to_json(&self) -> Map<String, Json> {
        self.fields
            .iter()
            .map(|(c, v)| (c.name().to_string(), v.to_json()))
            .collect()
    }
}

/// Run a write with `payload`; on a schema mismatch, retry once with the
/// reduced payload.
pub async fn with_column_retry<T, F, Fut>(
    store: &'static str,
    payload: ProductPayload,
    run: F,
) -> Result<T, StoreError>
where
    F: Fn(ProductPayload) -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    match run(payload.clone()).await {
        Err(err) => match payload.reduced_for(&err) {
            Some(reduced) => {
                warn!(store, error = %err, "Column not recognised, retrying without it");
                run(reduced).await
            }
            None => Err(err),
        },
        ok => ok,
    }
}

/// A `products` row as read from either backend.
#[derive(Debug, Clone, Deserialize, sqlx::FromRow)]
pub struct ProductRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub retail_price: f64,
    pub wholesale_price: f64,
    pub min_wholesale_qty: i64,
    #[serde(default)]
    #[sqlx(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default)]
    pub pinned_at: Option<i64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            image: non_empty(row.image),
            retail_price: row.retail_price,
            wholesale_price: row.wholesale_price,
            min_wholesale_qty: u32::try_from(row.min_wholesale_qty).unwrap_or(1).max(1),
            weight: row.weight_kg,
            description: non_empty(row.description),
            category: non_empty(row.category),
            pinned: row.pinned.unwrap_or(false),
            pinned_at: row.pinned_at,
        }
    }
}

/// A `categories` row.
#[derive(Debug, Clone, Deserialize, sqlx::FromRow)]
pub struct CategoryRow {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weighed_product() -> Product {
        Product {
            id: "42".to_string(),
            name: "Fried chicken".to_string(),
            image: None,
            retail_price: 79.0,
            wholesale_price: 60.0,
            min_wholesale_qty: 10,
            weight: Some(0.5),
            description: None,
            category: Some("Chicken".to_string()),
            pinned: false,
            pinned_at: None,
        }
    }

    fn unknown(column: Option<&str>) -> StoreError {
        StoreError::UnknownColumn {
            column: column.map(str::to_string),
            message: String::new(),
        }
    }

    #[test]
    fn test_insert_sends_weight_only_when_present() {
        let mut product = weighed_product();
        assert!(ProductPayload::insert(&product).contains(Column::WeightKg));
        product.weight = None;
        assert!(!ProductPayload::insert(&product).contains(Column::WeightKg));
    }

    #[test]
    fn test_sync_payload_leaves_pin_state_alone() {
        let mut product = weighed_product();
        product.pinned = true;
        product.pinned_at = Some(1_700_000_000_000);

        let json = ProductPayload::sync(&product).to_json();
        let mut columns: Vec<&str> = json.keys().map(String::as_str).collect();
        columns.sort_unstable();
        assert_eq!(
            columns,
            vec![
                "category",
                "description",
                "id",
                "image",
                "min_wholesale_qty",
                "name",
                "retail_price",
                "wholesale_price",
            ]
        );
    }

    #[test]
    fn test_update_payload_only_has_supplied_columns() {
        let payload = ProductPayload::update(&ProductUpdate::new().pinned(false).pinned_at(None));
        let json = payload.to_json();
        assert_eq!(json.len(), 2);
        assert_eq!(json["pinned"], Json::Bool(false));
        assert_eq!(json["pinned_at"], Json::Null);
    }

    #[test]
    fn test_reduced_for_drops_named_column() {
        let payload = ProductPayload::insert(&weighed_product());
        let reduced = payload.reduced_for(&unknown(Some("weight_kg"))).unwrap();
        assert!(!reduced.contains(Column::WeightKg));
        assert!(reduced.contains(Column::Pinned));
        // A second mismatch on the same column has nothing left to drop.
        assert!(reduced.reduced_for(&unknown(Some("weight_kg"))).is_none());
    }

    #[test]
    fn test_reduced_for_unnamed_column_drops_all_optional() {
        let payload = ProductPayload::insert(&weighed_product());
        let reduced = payload.reduced_for(&unknown(None)).unwrap();
        assert!(Column::ALL
            .into_iter()
            .filter(|c| c.is_optional())
            .all(|c| !reduced.contains(c)));
        assert!(reduced.contains(Column::Name));
    }

    #[test]
    fn test_reduced_for_refuses_required_or_unrelated_errors() {
        let payload = ProductPayload::insert(&weighed_product());
        assert!(payload.reduced_for(&unknown(Some("name"))).is_none());
        assert!(payload.reduced_for(&StoreError::RateLimited).is_none());
    }

    #[test]
    fn test_row_normalizes_empty_strings_and_flags() {
        let row: ProductRow = serde_json::from_str(
            r#"{"id":"1","name":"Rolls","image":"","retail_price":59,"wholesale_price":45,
                "min_wholesale_qty":10,"description":"","category":null,"pinned":null,"pinned_at":null,
                "created_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let product = Product::from(row);
        assert_eq!(product.image, None);
        assert_eq!(product.description, None);
        assert!(!product.pinned);
        assert_eq!(product.pinned_at, None);
    }
}
