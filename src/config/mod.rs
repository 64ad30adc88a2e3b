//! Configuration management for modcache

pub mod schema;

pub use schema::{BuildMode, CacheConfig, CacheSettings};

use crate::error::{ModcacheError, ModcacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File name searched for when no explicit config path is given
pub const CONFIG_FILE_NAME: &str = "modcache.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager for a specific file
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Find `modcache.toml` in `start` or any of its ancestors
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Directory the configuration is relative to
    pub fn project_dir(&self) -> &Path {
        self.config_path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> ModcacheResult<CacheConfig> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(CacheConfig::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> ModcacheResult<CacheConfig> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ModcacheError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| ModcacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}
