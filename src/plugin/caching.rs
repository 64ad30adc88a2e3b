//! Cache-aware wrapper around a pipeline plugin
//!
//! Wrapping keeps the plugin's hook surface intact: `start` is forwarded,
//! `end` flushes the cache before forwarding, and the module hooks consult
//! a per-plugin [`CacheStore`] before calling the original handler.
//!
//! On a cache hit the original hook is not invoked at all. Anything it
//! would have done besides returning a value (warnings, watch requests,
//! external writes) does not happen on that build. Only plugins whose
//! hooks are pure functions of their inputs should be allow-listed.

use crate::build::BuildConfig;
use crate::cache::{content_version, CacheStore};
use crate::error::{ModcacheError, ModcacheResult};
use crate::plugin::{
    EndHook, InputOptions, LoadHook, Plugin, PluginContext, ResolveHook, ResolveOptions,
    ResolvedId, SourceDescription, StartHook, TransformHook,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Version used for resolve and load entries. These are only invalidated
/// by moving to a new cache namespace.
pub const DEFAULT_VERSION: &str = "default";

/// Where a wrapped plugin keeps its cache and which build hash it runs under
#[derive(Debug, Clone)]
pub struct PluginCacheConfig {
    /// Cache namespace directory (already includes the build version hash)
    pub cache_dir: PathBuf,

    /// Build-wide version hash, mixed into transform versions
    pub version_hash: String,
}

/// Outcome of a cached hook call
#[derive(Debug, Clone, PartialEq)]
pub enum CachedCall<T> {
    /// The wrapped plugin does not implement the hook
    Absent,
    /// Served from the cache
    Hit(Option<T>),
    /// Computed by the original hook and stored
    Computed(Option<T>),
}

impl<T> CachedCall<T> {
    /// Collapse into the value handed back to the pipeline
    pub fn into_result(self) -> Option<T> {
        match self {
            Self::Absent => None,
            Self::Hit(value) | Self::Computed(value) => value,
        }
    }
}

struct CachedHooks {
    inner: Plugin,
    cache: CacheStore,
    version_hash: String,
}

impl CachedHooks {
    /// Serve `key` from the cache or compute it with `compute` and store it.
    ///
    /// A legitimate `None` from the original hook is cached like any other
    /// result. Errors are propagated and never cached.
    async fn cached<T, F>(&self, key: String, version: &str, compute: F) -> ModcacheResult<CachedCall<T>>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = ModcacheResult<Option<T>>>,
    {
        if let Some(hit) = self.cache.get_as::<Option<T>>(&key, version).await {
            debug!("Cache hit for {} in {}", key, self.inner.name);
            return Ok(CachedCall::Hit(hit));
        }

        debug!("Cache miss for {} in {}", key, self.inner.name);
        let result = compute.await?;
        self.cache.set_as(&key, version, &result).await?;
        Ok(CachedCall::Computed(result))
    }

    async fn resolve(
        &self,
        ctx: &dyn PluginContext,
        id: &str,
        importer: Option<&str>,
        options: &ResolveOptions,
    ) -> ModcacheResult<CachedCall<ResolvedId>> {
        let Some(hook) = &self.inner.resolve_module else {
            return Ok(CachedCall::Absent);
        };
        let key = format!("resolveModule:{},{}", id, Value::from(importer));
        self.cached(key, DEFAULT_VERSION, hook.resolve_module(ctx, id, importer, options))
            .await
    }

    async fn load(&self, ctx: &dyn PluginContext, id: &str) -> ModcacheResult<CachedCall<SourceDescription>> {
        let Some(hook) = &self.inner.load_module else {
            return Ok(CachedCall::Absent);
        };
        let key = format!("loadModule:{}", id);
        self.cached(key, DEFAULT_VERSION, hook.load_module(ctx, id)).await
    }

    async fn transform(
        &self,
        ctx: &dyn PluginContext,
        code: &str,
        id: &str,
    ) -> ModcacheResult<CachedCall<SourceDescription>> {
        let Some(hook) = &self.inner.transform_module else {
            return Ok(CachedCall::Absent);
        };
        let key = format!("transformModule:{}", id);
        let version = content_version(&self.version_hash, code);
        self.cached(key, &version, hook.transform_module(ctx, code, id))
            .await
    }
}

#[async_trait]
impl StartHook for CachedHooks {
    async fn start(&self, ctx: &dyn PluginContext, options: &InputOptions) -> ModcacheResult<()> {
        match &self.inner.start {
            Some(hook) => hook.start(ctx, options).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ResolveHook for CachedHooks {
    async fn resolve_module(
        &self,
        ctx: &dyn PluginContext,
        id: &str,
        importer: Option<&str>,
        options: &ResolveOptions,
    ) -> ModcacheResult<Option<ResolvedId>> {
        Ok(self.resolve(ctx, id, importer, options).await?.into_result())
    }
}

#[async_trait]
impl LoadHook for CachedHooks {
    async fn load_module(
        &self,
        ctx: &dyn PluginContext,
        id: &str,
    ) -> ModcacheResult<Option<SourceDescription>> {
        Ok(self.load(ctx, id).await?.into_result())
    }
}

#[async_trait]
impl TransformHook for CachedHooks {
    async fn transform_module(
        &self,
        ctx: &dyn PluginContext,
        code: &str,
        id: &str,
    ) -> ModcacheResult<Option<SourceDescription>> {
        Ok(self.transform(ctx, code, id).await?.into_result())
    }
}

#[async_trait]
impl EndHook for CachedHooks {
    async fn end(&self, ctx: &dyn PluginContext, error: Option<&ModcacheError>) -> ModcacheResult<()> {
        // Flush first so cache writes survive a failing end hook
        let flushed = self.cache.flush().await;
        if let Err(e) = &flushed {
            warn!("Failed to flush cache for {}: {}", self.inner.name, e);
        }

        let ended = match &self.inner.end {
            Some(hook) => hook.end(ctx, error).await,
            None => Ok(()),
        };

        flushed.and(ended)
    }
}

/// Wrap `plugin` so its hooks are served from a cache in `config.cache_dir`.
///
/// The wrapped plugin is named `cached(<name>)` and exposes every hook slot.
pub fn cached_plugin(plugin: Plugin, config: &PluginCacheConfig) -> Plugin {
    let cache = CacheStore::new(&config.cache_dir, &plugin.name);
    let name = format!("cached({})", plugin.name);
    let hooks = Arc::new(CachedHooks {
        inner: plugin,
        cache,
        version_hash: config.version_hash.clone(),
    });

    Plugin {
        name,
        start: Some(hooks.clone()),
        resolve_module: Some(hooks.clone()),
        load_module: Some(hooks.clone()),
        transform_module: Some(hooks.clone()),
        end: Some(hooks),
    }
}

/// Wrap every plugin of `build_config` whose name is in `cacheable`;
/// other plugins are passed through unchanged.
pub fn add_plugin_caching(
    mut build_config: BuildConfig,
    cacheable: &[String],
    config: &PluginCacheConfig,
) -> BuildConfig {
    build_config.plugins = build_config
        .plugins
        .into_iter()
        .map(|plugin| {
            if cacheable.iter().any(|name| *name == plugin.name) {
                debug!("Caching plugin {}", plugin.name);
                cached_plugin(plugin, config)
            } else {
                plugin
            }
        })
        .collect();
    build_config
}
