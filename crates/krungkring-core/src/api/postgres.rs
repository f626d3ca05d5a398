//! Primary store: PostgreSQL accessed directly with a connection string.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info, warn};

use super::schema::{with_column_retry, CategoryRow, Column, ProductPayload, ProductRow, Value};
use super::{RemoteStore, StoreError};
use crate::models::{Product, ProductUpdate};

const STORE_NAME: &str = "primary";

/// Connections kept by the pool. The storefront is lightly used.
const MAX_CONNECTIONS: u32 = 5;

/// How long to wait for a pooled connection before giving up.
const ACQUIRE_TIMEOUT_SECS: u64 = 5;

const SELECT_PRODUCTS: &str = r#"
    SELECT id, name, image,
           retail_price::float8 AS retail_price,
           wholesale_price::float8 AS wholesale_price,
           min_wholesale_qty::int8 AS min_wholesale_qty,
           description, category, pinned,
           pinned_at::int8 AS pinned_at
    FROM products
    ORDER BY created_at DESC
"#;

/// Primary remote store backed by PostgreSQL.
/// Clone is cheap - the pool is reference counted.
#[derive(Clone)]
pub struct PrimaryStore {
    pool: PgPool,
}

impl PrimaryStore {
    /// Create a store for `database_url`. No connection is opened until the
    /// first query, so an unreachable database only fails the calls that
    /// need it.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
            .connect_lazy(database_url)
            .context("Invalid primary database URL")?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &Value) {
        match value.clone() {
            Value::Text(v) => builder.push_bind(v),
            Value::Float(v) => builder.push_bind(v),
            Value::Int(v) => builder.push_bind(v),
            Value::Bool(v) => builder.push_bind(v),
            Value::Millis(v) => builder.push_bind(v),
        };
    }

    /// `INSERT INTO products (cols) VALUES (binds)`, optionally as an upsert
    /// on `id`.
    fn insert_query(payload: &ProductPayload, upsert: bool) -> QueryBuilder<'static, Postgres> {
        let fields = payload.fields();
        let mut builder = QueryBuilder::<Postgres>::new("INSERT INTO products (");
        let mut columns = builder.separated(", ");
        for (column, _) in fields {
            columns.push(column.name());
        }
        builder.push(") VALUES (");
        for (i, (_, value)) in fields.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            Self::push_value(&mut builder, value);
        }
        builder.push(")");

        if upsert {
            builder.push(" ON CONFLICT (id) DO UPDATE SET ");
            let mut sets = builder.separated(", ");
            for (column, _) in fields.iter().filter(|(c, _)| *c != Column::Id) {
                sets.push(format!("{0} = EXCLUDED.{0}", column.name()));
            }
            builder.push(", updated_at = now()");
        }
        builder
    }

    fn update_query(id: &str, payload: &ProductPayload) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE products SET ");
        for (column, value) in payload.fields() {
            builder.push(column.name());
            builder.push(" = ");
            Self::push_value(&mut builder, value);
            builder.push(", ");
        }
        builder.push("updated_at = now() WHERE id = ");
        builder.push_bind(id.to_string());
        builder
    }

    async fn execute_insert(&self, payload: ProductPayload, upsert: bool) -> Result<(), StoreError> {
        let mut builder = Self::insert_query(&payload, upsert);
        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn execute_update(&self, id: &str, payload: ProductPayload) -> Result<(), StoreError> {
        let mut builder = Self::update_query(id, &payload);
        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            debug!(store = STORE_NAME, id, "Update matched no product");
        }
        Ok(())
    }

    /// Delete every product and insert `payloads` in one transaction. Any
    /// error drops the transaction, which rolls it back.
    async fn execute_replace(&self, payloads: &[ProductPayload]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM products").execute(&mut *tx).await?;
        for payload in payloads {
            let mut builder = Self::insert_query(payload, false);
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Payloads to retry a batch with after `err`, or `None` when no payload
/// has a column to drop.
fn reduced_batch(payloads: &[ProductPayload], err: &StoreError) -> Option<Vec<ProductPayload>> {
    let reduced: Vec<Option<ProductPayload>> = payloads.iter().map(|p| p.reduced_for(err)).collect();
    if reduced.iter().all(Option::is_none) {
        return None;
    }
    Some(
        reduced
            .into_iter()
            .zip(payloads)
            .map(|(reduced, original)| reduced.unwrap_or_else(|| original.clone()))
            .collect(),
    )
}

#[async_trait]
impl RemoteStore for PrimaryStore {
    fn name(&self) -> &'static str {
        STORE_NAME
    }

    async fn initialize(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                image TEXT,
                retail_price NUMERIC NOT NULL DEFAULT 0,
                wholesale_price NUMERIC NOT NULL DEFAULT 0,
                min_wholesale_qty INTEGER NOT NULL DEFAULT 1,
                description TEXT,
                category TEXT,
                pinned BOOLEAN NOT NULL DEFAULT FALSE,
                pinned_at BIGINT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id SERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Tables created before pinning existed
        sqlx::query("ALTER TABLE products ADD COLUMN IF NOT EXISTS pinned BOOLEAN NOT NULL DEFAULT FALSE")
            .execute(&self.pool)
            .await?;
        sqlx::query("ALTER TABLE products ADD COLUMN IF NOT EXISTS pinned_at BIGINT")
            .execute(&self.pool)
            .await?;

        info!(store = STORE_NAME, "Schema initialized");
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows: Vec<ProductRow> = sqlx::query_as(SELECT_PRODUCTS).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn list_categories(&self) -> Result<Vec<String>, StoreError> {
        let rows: Vec<CategoryRow> = sqlx::query_as("SELECT name FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    async fn insert_product(&self, product: &Product) -> Result<Product, StoreError> {
        with_column_retry(STORE_NAME, ProductPayload::insert(product), move |payload| {
            self.execute_insert(payload, false)
        })
        .await?;
        Ok(product.clone())
    }

    async fn delete_product(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_product(&self, id: &str, update: &ProductUpdate) -> Result<(), StoreError> {
        with_column_retry(STORE_NAME, ProductPayload::update(update), move |payload| {
            self.execute_update(id, payload)
        })
        .await
    }

    async fn replace_products(&self, products: &[Product]) -> Result<(), StoreError> {
        let payloads: Vec<ProductPayload> = products.iter().map(ProductPayload::insert).collect();
        match self.execute_replace(&payloads).await {
            Err(err) => match reduced_batch(&payloads, &err) {
                Some(reduced) => {
                    warn!(store = STORE_NAME, error = %err, "Column not recognised, retrying replace without it");
                    self.execute_replace(&reduced).await
                }
                None => Err(err),
            },
            ok => ok,
        }
    }

    async fn upsert_products(&self, products: &[Product]) -> Result<(), StoreError> {
        for product in products {
            self.execute_insert(ProductPayload::sync(product), true).await?;
        }
        Ok(())
    }

    async fn insert_category(&self, name: &str) -> Result<Vec<String>, StoreError> {
        sqlx::query("INSERT INTO categories (name) VALUES ($1)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        self.list_categories().await
    }

    async fn upsert_categories(&self, names: &[String]) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO categories (name)
            SELECT n FROM UNNEST($1::text[]) AS n
            WHERE NOT EXISTS (SELECT 1 FROM categories c WHERE c.name = n)
            "#,
        )
        .bind(names)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_category(&self, name: &str) -> Result<Vec<String>, StoreError> {
        sqlx::query("DELETE FROM categories WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        self.list_categories().await
    }

    async fn rename_category(&self, from: &str, to: &str) -> Result<Vec<String>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE categories SET name = $2 WHERE name = $1")
            .bind(from)
            .bind(to)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE products SET category = $2, updated_at = now() WHERE category = $1")
            .bind(from)
            .bind(to)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.list_categories().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    use sqlx::error::{DatabaseError, ErrorKind};

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

    /// What PostgreSQL returns for a column the table lacks.
    #[derive(Debug)]
    struct UndefinedColumn;

    impl fmt::Display for UndefinedColumn {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.message())
        }
    }

    impl StdError for UndefinedColumn {}

    impl DatabaseError for UndefinedColumn {
        fn message(&self) -> &str {
            r#"column "weight_kg" of relation "products" does not exist"#
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed("42703"))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    #[test]
    fn test_insert_sql_binds_every_column() {
        let payload = ProductPayload::insert(&weighed_product());
        let builder = PrimaryStore::insert_query(&payload, false);
        assert_eq!(
            builder.sql(),
            "INSERT INTO products (id, name, image, retail_price, wholesale_price, \
             min_wholesale_qty, description, category, pinned, pinned_at, weight_kg) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        );
    }

    #[test]
    fn test_upsert_sql_skips_id_and_stamps_updated_at() {
        let payload = ProductPayload::sync(&weighed_product());
        let builder = PrimaryStore::insert_query(&payload, true);
        let sql = builder.sql();

        let (_, sets) = sql.split_once(" ON CONFLICT (id) DO UPDATE SET ").unwrap();
        assert!(!sets.contains("id = EXCLUDED.id"));
        assert!(sets.starts_with("name = EXCLUDED.name, image = EXCLUDED.image"));
        assert!(sets.ends_with("category = EXCLUDED.category, updated_at = now()"));
        assert!(!sql.contains("pinned"));
    }

    #[test]
    fn test_update_sql_sets_supplied_columns() {
        let update = ProductUpdate::new().name("Crispy rolls").pinned(false).normalized();
        let builder = PrimaryStore::update_query("7", &ProductPayload::update(&update));
        assert_eq!(
            builder.sql(),
            "UPDATE products SET name = $1, pinned = $2, pinned_at = $3, \
             updated_at = now() WHERE id = $4"
        );
    }

    #[test]
    fn test_undefined_column_retries_without_weight() {
        let err = StoreError::from(sqlx::Error::Database(Box::new(UndefinedColumn)));
        assert!(err.is_schema_mismatch());
        assert_eq!(err.unknown_column(), Some("weight_kg"));

        let payload = ProductPayload::insert(&weighed_product());
        let reduced = payload.reduced_for(&err).unwrap();
        let builder = PrimaryStore::insert_query(&reduced, false);
        assert!(!builder.sql().contains("weight_kg"));
        assert!(builder.sql().ends_with("$10)"));
    }

    #[test]
    fn test_replace_batch_is_reduced_as_a_whole() {
        let mut light = weighed_product();
        light.id = "43".to_string();
        light.weight = None;
        let payloads = vec![
            ProductPayload::insert(&weighed_product()),
            ProductPayload::insert(&light),
        ];
        let err = StoreError::from(sqlx::Error::Database(Box::new(UndefinedColumn)));

        let reduced = reduced_batch(&payloads, &err).unwrap();
        assert_eq!(reduced.len(), 2);
        assert!(reduced.iter().all(|p| !p.contains(Column::WeightKg)));
        assert_eq!(reduced[1], payloads[1]);

        // Nothing left to drop: no second retry.
        assert!(reduced_batch(&reduced, &err).is_none());
        assert!(reduced_batch(&payloads, &StoreError::RateLimited).is_none());
    }
}
