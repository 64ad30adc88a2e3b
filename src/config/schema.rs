//! Configuration schema for modcache
//!
//! Configuration is read from `modcache.toml`. Every field is optional;
//! [`CacheConfig::resolve`] turns the file contents into [`CacheSettings`]
//! with all defaults filled in and validated.

use crate::build::Pattern;
use crate::error::{ModcacheError, ModcacheResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default location of cache namespaces, relative to the project
pub const DEFAULT_CACHE_DIR: &str = "node_modules/.cache/modcache";

/// Default prebuild directory, relative to the build output directory
pub const DEFAULT_PREBUILD_DIR: &str = "./npm";

/// Plugins whose hooks are known to depend only on their inputs
pub const DEFAULT_CACHEABLE_PLUGINS: &[&str] = &["babel", "commonjs", "node-resolve"];

/// Build mode, normally taken from `NODE_ENV` by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Development,
    Production,
}

impl BuildMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildMode {
    type Err = String;

    /// Anything other than `production` builds in development mode
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "production" => Ok(Self::Production),
            _ => Ok(Self::Development),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name of this build's cache, a directory under `cache_dir`
    pub name: String,

    /// Directory holding all caches
    pub cache_dir: PathBuf,

    /// Extra files whose content invalidates the whole cache
    pub dependencies: Vec<PathBuf>,

    /// Enable caching (default: off in production builds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Where prebuilt bundles go, relative to the output directory
    pub prebuild_dir: String,

    /// Dependencies to prebuild
    pub prebuild: Vec<Pattern>,

    /// Plugins eligible for hook caching
    pub cacheable_plugins: Vec<String>,

    /// File extension of prebuilt bundles
    pub bundle_extension: String,

    /// Maximum concurrent bundle builds (0 = available parallelism)
    pub prebuild_concurrency: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            dependencies: vec![],
            enabled: None,
            prebuild_dir: DEFAULT_PREBUILD_DIR.to_string(),
            prebuild: vec![],
            cacheable_plugins: DEFAULT_CACHEABLE_PLUGINS
                .iter()
                .map(|name| name.to_string())
                .collect(),
            bundle_extension: "js".to_string(),
            prebuild_concurrency: 0,
        }
    }
}

/// Fully resolved settings used by the core
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub name: String,

    /// Project root; relative paths are resolved against it
    pub project_dir: PathBuf,

    /// `cache_dir/name`, absolute
    pub cache_root: PathBuf,

    pub dependencies: Vec<PathBuf>,

    pub enabled: bool,

    pub mode: BuildMode,

    pub prebuild_dir: String,

    pub prebuild: Vec<Pattern>,

    pub cacheable_plugins: Vec<String>,

    pub bundle_extension: String,

    pub prebuild_concurrency: usize,
}

impl CacheSettings {
    /// Cache directory for a given build-wide version hash
    pub fn namespace(&self, version_hash: &str) -> PathBuf {
        self.cache_root.join(version_hash)
    }
}

impl CacheConfig {
    /// Validate and fill in defaults for a build in `mode` rooted at `project_dir`
    pub fn resolve(&self, mode: BuildMode, project_dir: &Path) -> ModcacheResult<CacheSettings> {
        if self.name.is_empty() || self.name.contains(['/', '\\']) || self.name == ".." {
            return Err(ModcacheError::ConfigValue {
                field: "name",
                reason: format!("{:?} is not a valid directory name", self.name),
            });
        }
        if self.bundle_extension.is_empty() || self.bundle_extension.starts_with('.') {
            return Err(ModcacheError::ConfigValue {
                field: "bundle_extension",
                reason: "expected an extension without a leading dot, e.g. \"js\"".to_string(),
            });
        }
        if self.prebuild_dir.is_empty() {
            return Err(ModcacheError::ConfigValue {
                field: "prebuild_dir",
                reason: "must not be empty".to_string(),
            });
        }

        let prebuild_concurrency = match self.prebuild_concurrency {
            0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        };

        Ok(CacheSettings {
            name: self.name.clone(),
            project_dir: project_dir.to_path_buf(),
            cache_root: project_dir.join(&self.cache_dir).join(&self.name),
            dependencies: self.dependencies.clone(),
            enabled: self.enabled.unwrap_or(mode != BuildMode::Production),
            mode,
            prebuild_dir: self.prebuild_dir.clone(),
            prebuild: self.prebuild.clone(),
            cacheable_plugins: self.cacheable_plugins.clone(),
            bundle_extension: self.bundle_extension.clone(),
            prebuild_concurrency,
        })
    }
}
