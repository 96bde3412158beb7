use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Session cookie string sent with every upstream request.
    pub cookies: Option<String>,
    /// Handle whose followees are tracked. Resolved from the session
    /// when absent.
    pub root_handle: Option<String>,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_feed_limit")]
    pub feed_limit: u32,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("follow-feed");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("feed.db").to_string_lossy().to_string()
}

fn default_batch_size() -> u32 {
    50
}

fn default_feed_limit() -> u32 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cookies: None,
            root_handle: None,
            batch_size: default_batch_size(),
            feed_limit: default_feed_limit(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("follow-feed")
            .join("config.toml")
    }

    pub fn cookies(&self) -> Result<&str> {
        self.cookies.as_deref().ok_or_else(|| {
            AppError::Config(format!(
                "No session cookies configured. Set `cookies` in {}",
                Self::config_path().display()
            ))
        })
    }
}
