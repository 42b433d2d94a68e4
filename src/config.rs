use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

/// Env var pointing at an optional JSON config file.
pub const CONFIG_ENV: &str = "PROJET_HUB_CONFIG";
pub const DATA_DIR_ENV: &str = "PROJET_HUB_DATA_DIR";
pub const PAGE_SIZE_ENV: &str = "PROJET_HUB_PAGE_SIZE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub db_file: String,
    pub page_size: usize,
    /// Quiet period for list-page search boxes.
    pub list_debounce_ms: u64,
    /// Quiet period for the header quick search.
    pub header_debounce_ms: u64,
    pub min_query_len: usize,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_file: "projet-hub.sqlite".to_string(),
            page_size: 5,
            list_debounce_ms: 400,
            header_debounce_ms: 150,
            min_query_len: 2,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the JSON file named by `PROJET_HUB_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {path}"))?;
                serde_json::from_str::<AppConfig>(&raw)
                    .with_context(|| format!("failed to parse config file {path}"))?
            }
            Err(_) => AppConfig::default(),
        };

        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(size) = std::env::var(PAGE_SIZE_ENV) {
            config.page_size = size
                .parse()
                .with_context(|| format!("{PAGE_SIZE_ENV} must be a positive integer"))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.page_size == 0 {
            return Err(AppError::Config("page_size must be at least 1".to_string()));
        }
        if self.min_query_len == 0 {
            return Err(AppError::Config("min_query_len must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    pub fn list_debounce(&self) -> Duration {
        Duration::from_millis(self.list_debounce_ms)
    }

    pub fn header_debounce(&self) -> Duration {
        Duration::from_millis(self.header_debounce_ms)
    }
}

/// Per-user data directory. Falls back to the working directory when no home is set.
pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(app_data) = std::env::var("APPDATA") {
            return PathBuf::from(app_data).join("projet-hub");
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/share/projet-hub");
        }
    }

    PathBuf::from(".projet-hub")
}
