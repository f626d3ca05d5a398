use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::utils::truncate_string;

/// PostgreSQL `undefined_column`.
const PG_UNDEFINED_COLUMN: &str = "42703";

/// PostgREST "column not found in schema cache".
const POSTGREST_UNKNOWN_COLUMN: &str = "PGRST204";

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} store is not configured")]
    NotConfigured(&'static str),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The backend does not know one of the columns we wrote.
    #[error("Unknown column {}: {message}", column.as_deref().unwrap_or("<unidentified>"))]
    UnknownColumn {
        column: Option<String>,
        message: String,
    },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - check the store API key")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Store task aborted: {0}")]
    Aborted(String),
}

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl StoreError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        truncate_string(body, MAX_ERROR_BODY_LENGTH)
    }

    /// Classify a non-success PostgREST response.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        if let Ok(parsed) = serde_json::from_str::<PostgrestError>(body) {
            let message = parsed.message.unwrap_or_default();
            if let Some(code) = parsed.code.as_deref() {
                if code == POSTGREST_UNKNOWN_COLUMN || code == PG_UNDEFINED_COLUMN {
                    return Self::unknown_column_from_message(message);
                }
            }
        }

        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => StoreError::Unauthorized,
            403 => StoreError::AccessDenied(truncated),
            404 => StoreError::NotFound(truncated),
            429 => StoreError::RateLimited,
            500..=599 => StoreError::ServerError(truncated),
            _ => StoreError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    fn unknown_column_from_message(message: String) -> Self {
        StoreError::UnknownColumn {
            column: first_quoted(&message).map(str::to_string),
            message,
        }
    }

    /// True when the backend rejected a write because of an unrecognised
    /// column, meaning a reduced payload may succeed.
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, StoreError::UnknownColumn { .. })
    }

    /// The offending column, when the backend named it.
    pub fn unknown_column(&self) -> Option<&str> {
        match self {
            StoreError::UnknownColumn { column, .. } => column.as_deref(),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.code().as_deref() == Some(PG_UNDEFINED_COLUMN) {
                return Self::unknown_column_from_message(db_err.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}

/// First substring enclosed in matching single or double quotes.
///
/// PostgreSQL reports `column "weight_kg" of relation "products" does not
/// exist`; PostgREST reports `Could not find the 'weight_kg' column of
/// 'products' in the schema cache`. Both name the column first.
fn first_quoted(message: &str) -> Option<&str> {
    let (start, quote) = message.char_indices().find(|(_, c)| *c == '"' || *c == '\'')?;
    let rest = &message[start + 1..];
    let end = rest.find(quote)?;
    Some(&rest[..end]).filter(|s| !s.is_empty())
}
