//! Secondary store: a PostgREST table API (`/rest/v1/<table>`).
//!
//! This module provides the `SecondaryStore` for reading and writing the
//! `products` and `categories` tables over HTTP with an API key.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client, Method};
use serde::de::DeserializeOwned;
use serde_json::{json, Value as Json};
use tracing::warn;

use super::schema::{with_column_retry, CategoryRow, ProductPayload, ProductRow};
use super::{RemoteStore, StoreError};
use crate::models::{Product, ProductUpdate};

// ============================================================================
// Constants
// ============================================================================

const STORE_NAME: &str = "secondary";

/// Path of the table API below the project URL.
const REST_PATH: &str = "/rest/v1";

/// HTTP request timeout in seconds.
/// Reads are bounded tighter by the data service; this caps writes.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

const PREFER_MINIMAL: &str = "return=minimal";
const PREFER_MERGE: &str = "resolution=merge-duplicates,return=minimal";
const PREFER_IGNORE: &str = "resolution=ignore-duplicates,return=minimal";

/// Secondary remote store.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct SecondaryStore {
    client: Client,
    base_url: String,
}

impl SecondaryStore {
    /// Create a store for the project at `project_url`, authenticating every
    /// request with `api_key`.
    pub fn new(project_url: &str, api_key: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let key = header::HeaderValue::from_str(api_key).context("Invalid secondary store API key")?;
        headers.insert("apikey", key);
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .context("Invalid secondary store API key")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}{}", project_url.trim_end_matches('/'), REST_PATH),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    /// Check if response is successful, returning a classified error if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::from_status(status, &body))
        }
    }

    async fn get<T: DeserializeOwned>(&self, table: &str, query: &[(&str, &str)]) -> Result<T, StoreError> {
        let url = self.table_url(table);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.client.get(&url).query(query).send().await?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(StoreError::RateLimited);
                }
                warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2; // Exponential backoff
                continue;
            }

            let response = Self::check_response(response).await?;
            return Ok(response.json().await?);
        }
    }

    /// Send a write and discard the response body.
    async fn send(
        &self,
        method: Method,
        table: &str,
        query: &[(&str, String)],
        body: Option<&Json>,
        prefer: &str,
    ) -> Result<(), StoreError> {
        let mut request = self
            .client
            .request(method, self.table_url(table))
            .query(query)
            .header("Prefer", prefer);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        Self::check_response(response).await?;
        Ok(())
    }

    async fn post_product(&self, payload: ProductPayload, upsert: bool) -> Result<(), StoreError> {
        let body = Json::Object(payload.to_json());
        if upsert {
            let query = [("on_conflict", "id".to_string())];
            self.send(Method::POST, "products", &query, Some(&body), PREFER_MERGE).await
        } else {
            self.send(Method::POST, "products", &[], Some(&body), PREFER_MINIMAL).await
        }
    }

    async fn patch_product(&self, id: &str, payload: ProductPayload) -> Result<(), StoreError> {
        let mut fields = payload.to_json();
        fields.insert("updated_at".to_string(), Json::String(Utc::now().to_rfc3339()));
        let query = [("id", format!("eq.{}", id))];
        self.send(Method::PATCH, "products", &query, Some(&Json::Object(fields)), PREFER_MINIMAL)
            .await
    }
}

#[async_trait]
impl RemoteStore for SecondaryStore {
    fn name(&self) -> &'static str {
        STORE_NAME
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows: Vec<ProductRow> = self
            .get("products", &[("select", "*"), ("order", "created_at.desc")])
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn list_categories(&self) -> Result<Vec<String>, StoreError> {
        let rows: Vec<CategoryRow> = self
            .get("categories", &[("select", "name"), ("order", "name.asc")])
            .await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    async fn insert_product(&self, product: &Product) -> Result<Product, StoreError> {
        with_column_retry(STORE_NAME, ProductPayload::insert(product), move |payload| {
            self.post_product(payload, false)
        })
        .await?;
        Ok(product.clone())
    }

    async fn delete_product(&self, id: &str) -> Result<(), StoreError> {
        let query = [("id", format!("eq.{}", id))];
        self.send(Method::DELETE, "products", &query, None, PREFER_MINIMAL).await
    }

    async fn update_product(&self, id: &str, update: &ProductUpdate) -> Result<(), StoreError> {
        with_column_retry(STORE_NAME, ProductPayload::update(update), move |payload| {
            self.patch_product(id, payload)
        })
        .await
    }

    async fn replace_products(&self, products: &[Product]) -> Result<(), StoreError> {
        // PostgREST refuses unfiltered deletes; every id differs from "".
        let query = [("id", "neq.".to_string())];
        self.send(Method::DELETE, "products", &query, None, PREFER_MINIMAL).await?;
        for product in products {
            self.insert_product(product).await?;
        }
        Ok(())
    }

    async fn upsert_products(&self, products: &[Product]) -> Result<(), StoreError> {
        for product in products {
            self.post_product(ProductPayload::sync(product), true).await?;
        }
        Ok(())
    }

    async fn insert_category(&self, name: &str) -> Result<Vec<String>, StoreError> {
        let body = json!({ "name": name });
        self.send(Method::POST, "categories", &[], Some(&body), PREFER_MINIMAL).await?;
        self.list_categories().await
    }

    async fn upsert_categories(&self, names: &[String]) -> Result<(), StoreError> {
        if names.is_empty() {
            return Ok(());
        }
        let body = Json::Array(names.iter().map(|n| json!({ "name": n })).collect());
        let query = [("on_conflict", "name".to_string())];
        self.send(Method::POST, "categories", &query, Some(&body), PREFER_IGNORE).await
    }

    async fn delete_category(&self, name: &str) -> Result<Vec<String>, StoreError> {
        let query = [("name", format!("eq.{}", name))];
        self.send(Method::DELETE, "categories", &query, None, PREFER_MINIMAL).await?;
        self.list_categories().await
    }

    async fn rename_category(&self, from: &str, to: &str) -> Result<Vec<String>, StoreError> {
        let query = [("name", format!("eq.{}", from))];
        let body = json!({ "name": to });
        self.send(Method::PATCH, "categories", &query, Some(&body), PREFER_MINIMAL).await?;

        let query = [("category", format!("eq.{}", from))];
        let body = json!({ "category": to, "updated_at": Utc::now().to_rfc3339() });
        self.send(Method::PATCH, "products", &query, Some(&body), PREFER_MINIMAL).await?;

        self.list_categories().await
    }
}
