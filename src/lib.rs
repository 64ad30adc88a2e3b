//! modcache - incremental build memoization and dependency prebundling
//!
//! Wraps the plugins of a module build pipeline with persistent,
//! versioned caches and prebuilds large third-party dependencies into
//! standalone bundles that reference each other by relative path.

pub mod build;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod plugin;
pub mod prebuild;

pub use error::{ModcacheError, ModcacheResult};

use crate::build::BuildConfig;
use crate::cache::compute_version_hash;
use crate::config::CacheSettings;
use crate::plugin::caching::{add_plugin_caching, PluginCacheConfig};
use crate::prebuild::{add_prebuilding, Bundler, EntryResolver, NodeModulesResolver, PrebuildOptions};
use std::sync::Arc;
use tracing::debug;

/// External collaborators needed when prebuilding is configured
#[derive(Clone)]
pub struct Collaborators {
    /// Builds one standalone bundle per prebuilt dependency
    pub bundler: Arc<dyn Bundler>,

    /// Locates the entry file of a dependency so its package.json can be found
    pub resolver: Arc<dyn EntryResolver>,
}

impl Collaborators {
    /// Use `bundler` together with node_modules resolution from the project dir
    pub fn new(bundler: Arc<dyn Bundler>, settings: &CacheSettings) -> Self {
        Self {
            bundler,
            resolver: Arc::new(NodeModulesResolver::new(&settings.project_dir)),
        }
    }
}

/// Wrap a build configuration with plugin caching and, when prebuild
/// patterns are configured, dependency prebuilding.
///
/// Returns the configuration unchanged when caching is disabled.
pub async fn cache_build(
    settings: &CacheSettings,
    build_config: BuildConfig,
    collaborators: Collaborators,
) -> ModcacheResult<BuildConfig> {
    if !settings.enabled {
        debug!("Build caching disabled ({} mode)", settings.mode);
        return Ok(build_config);
    }

    let prebuilding = !settings.prebuild.is_empty();
    if prebuilding {
        // Reject unsupported output layouts before doing any work
        build_config.single_output()?;
    }

    let version_hash = compute_version_hash(&settings.project_dir, &settings.dependencies).await?;
    let cache_dir = settings.namespace(&version_hash);
    debug!("Cache namespace: {}", cache_dir.display());

    let wrapped = add_plugin_caching(
        build_config,
        &settings.cacheable_plugins,
        &PluginCacheConfig {
            cache_dir,
            version_hash,
        },
    );

    if !prebuilding {
        return Ok(wrapped);
    }

    add_prebuilding(
        wrapped,
        PrebuildOptions::from_settings(settings),
        collaborators.bundler,
        collaborators.resolver,
    )
}
