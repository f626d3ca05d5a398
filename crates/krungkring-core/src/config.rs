//! Application configuration management.
//!
//! Settings come from `~/.config/krungkring/config.json` when it exists,
//! then environment variables override individual fields:
//!
//! - `DATABASE_URL` (or `VITE_DATABASE_URL`): primary PostgreSQL store
//! - `SUPABASE_URL`, `SUPABASE_KEY` (or `SUPABASE_SERVICE_ROLE_KEY`):
//!   secondary store
//! - `KRUNGKRING_DATA_DIR`: local store directory

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_TTL;
use crate::service::DEFAULT_REMOTE_TIMEOUT;

/// Application name used for config/data directory paths
const APP_NAME: &str = "krungkring";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub secondary_url: Option<String>,
    #[serde(default)]
    pub secondary_key: Option<String>,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub remote_timeout_secs: Option<u64>,
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
}

impl Config {
    /// Load the config file, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config = Self::load_from(&Self::config_path()?)?;
        Ok(config.with_env(|key| std::env::var(key).ok()))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Override fields from `var`, which looks up an environment variable.
    /// Empty values are ignored.
    pub fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |keys: &[&str]| keys.iter().find_map(|k| var(*k).filter(|v| !v.is_empty()));

        if let Some(url) = lookup(&["DATABASE_URL", "VITE_DATABASE_URL"]) {
            self.database_url = Some(url);
        }
        if let Some(url) = lookup(&["SUPABASE_URL"]) {
            self.secondary_url = Some(url);
        }
        if let Some(key) = lookup(&["SUPABASE_KEY", "SUPABASE_SERVICE_ROLE_KEY"]) {
            self.secondary_key = Some(key);
        }
        if let Some(dir) = lookup(&["KRUNGKRING_DATA_DIR"]) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        self
    }

    /// Directory holding the local store.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn remote_timeout(&self) -> Duration {
        self.remote_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REMOTE_TIMEOUT)
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TTL)
    }
}
