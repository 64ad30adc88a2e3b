//! CLI command implementations

pub mod cache;
pub mod config;
pub mod hash;

pub use cache::execute as cache;
pub use config::execute as config;
pub use hash::execute as hash;

use crate::config::{CacheConfig, CacheSettings, ConfigManager};

/// Configuration shared by every command
pub struct CommandContext {
    pub manager: ConfigManager,
    pub config: CacheConfig,
    pub settings: CacheSettings,
}
