//! krungkring-sync - copies the catalog from the primary store into the
//! secondary store.
//!
//! Prints `{"success":true,"synced":{"products":N,"categories":M}}` on
//! success, or `{"error":"..."}` and exits non-zero.
//!
//! Usage: `krungkring-sync [--init]`. `--init` creates the primary store's
//! tables before syncing.

use std::io;
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use serde_json::json;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use krungkring_core::api::{PrimaryStore, RemoteStore, SecondaryStore};
use krungkring_core::sync::{sync_stores, SyncReport};
use krungkring_core::Config;

/// Directory for daily log files. Unset means stderr only.
const LOG_DIR_ENV: &str = "KRUNGKRING_LOG_DIR";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file writer and must be held until exit.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "krungkring-sync.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

async fn run(init: bool) -> Result<SyncReport> {
    let config = Config::load()?;

    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow!("DATABASE_URL not set"))?;
    let (Some(url), Some(key)) = (config.secondary_url.as_deref(), config.secondary_key.as_deref())
    else {
        return Err(anyhow!("SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY must be set"));
    };

    let primary = PrimaryStore::connect_lazy(database_url)?;
    let secondary = SecondaryStore::new(url, key)?;

    if init {
        primary.initialize().await?;
    }

    sync_stores(&primary, &secondary).await
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let init = std::env::args().skip(1).any(|arg| arg == "--init");
    info!(init, "krungkring-sync starting");

    match run(init).await {
        Ok(report) => {
            println!("{}", json!({ "success": true, "synced": report }));
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}", json!({ "error": format!("{:#}", e) }));
            ExitCode::FAILURE
        }
    }
}
