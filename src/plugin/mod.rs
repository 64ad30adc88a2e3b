//! Pipeline plugin hook surface
//!
//! A [`Plugin`] is a name plus a fixed set of optional hooks. Hook presence
//! is explicit: each slot is either `Some(handler)` or `None`, and the host
//! pipeline treats a `None` slot as "no opinion".
//!
//! Hooks receive the host's [`PluginContext`] as their first argument.
//! Wrappers forward it untouched so a plugin behaves the same whether it
//! is wrapped or not.

pub mod caching;

use crate::error::{ModcacheError, ModcacheResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a successful module resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedId {
    /// Resolved module id (usually an absolute path)
    pub id: String,

    /// Whether the module should be left out of the bundle
    #[serde(default)]
    pub external: bool,
}

impl ResolvedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: false,
        }
    }
}

/// Module source produced by a load or transform hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescription {
    pub code: String,

    /// Serialized source map, if the hook produced one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
}

impl SourceDescription {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            map: None,
        }
    }
}

/// Options passed to `resolve_module`
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Whether the module being resolved is a build entry point
    pub is_entry: bool,
}

/// Options passed to `start`
#[derive(Debug, Clone, Default)]
pub struct InputOptions {
    /// Entry module ids of the build
    pub input: Vec<String>,
}

/// Services the host pipeline makes available to hooks
pub trait PluginContext: Send + Sync {
    /// Report a non-fatal diagnostic
    fn warn(&self, message: &str);

    /// Ask the host to watch an additional file
    fn add_watch_file(&self, path: &Path);
}

/// Context that reports diagnostics through `tracing` and ignores watch requests
#[derive(Debug, Clone, Default)]
pub struct TracingContext;

impl PluginContext for TracingContext {
    fn warn(&self, message: &str) {
        warn!("{}", message);
    }

    fn add_watch_file(&self, path: &Path) {
        debug!("Watch request ignored: {}", path.display());
    }
}

#[async_trait]
pub trait StartHook: Send + Sync {
    async fn start(&self, ctx: &dyn PluginContext, options: &InputOptions) -> ModcacheResult<()>;
}

#[async_trait]
pub trait ResolveHook: Send + Sync {
    async fn resolve_module(
        &self,
        ctx: &dyn PluginContext,
        id: &str,
        importer: Option<&str>,
        options: &ResolveOptions,
    ) -> ModcacheResult<Option<ResolvedId>>;
}

#[async_trait]
pub trait LoadHook: Send + Sync {
    async fn load_module(
        &self,
        ctx: &dyn PluginContext,
        id: &str,
    ) -> ModcacheResult<Option<SourceDescription>>;
}

#[async_trait]
pub trait TransformHook: Send + Sync {
    async fn transform_module(
        &self,
        ctx: &dyn PluginContext,
        code: &str,
        id: &str,
    ) -> ModcacheResult<Option<SourceDescription>>;
}

#[async_trait]
pub trait EndHook: Send + Sync {
    /// Called once when the build finishes; `error` is the build failure, if any
    async fn end(&self, ctx: &dyn PluginContext, error: Option<&ModcacheError>) -> ModcacheResult<()>;
}

/// A named set of optional hooks
#[derive(Clone)]
pub struct Plugin {
    pub name: String,
    pub start: Option<Arc<dyn StartHook>>,
    pub resolve_module: Option<Arc<dyn ResolveHook>>,
    pub load_module: Option<Arc<dyn LoadHook>>,
    pub transform_module: Option<Arc<dyn TransformHook>>,
    pub end: Option<Arc<dyn EndHook>>,
}

impl Plugin {
    /// Create a plugin with no hooks
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: None,
            resolve_module: None,
            load_module: None,
            transform_module: None,
            end: None,
        }
    }

    pub fn with_start(mut self, hook: impl StartHook + 'static) -> Self {
        self.start = Some(Arc::new(hook));
        self
    }

    pub fn with_resolve(mut self, hook: impl ResolveHook + 'static) -> Self {
        self.resolve_module = Some(Arc::new(hook));
        self
    }

    pub fn with_load(mut self, hook: impl LoadHook + 'static) -> Self {
        self.load_module = Some(Arc::new(hook));
        self
    }

    pub fn with_transform(mut self, hook: impl TransformHook + 'static) -> Self {
        self.transform_module = Some(Arc::new(hook));
        self
    }

    pub fn with_end(mut self, hook: impl EndHook + 'static) -> Self {
        self.end = Some(Arc::new(hook));
        self
    }

    /// Names of the hooks this plugin implements
    pub fn hook_names(&self) -> Vec<&'static str> {
        let slots = [
            ("start", self.start.is_some()),
            ("resolve_module", self.resolve_module.is_some()),
            ("load_module", self.load_module.is_some()),
            ("transform_module", self.transform_module.is_some()),
            ("end", self.end.is_some()),
        ];
        slots
            .into_iter()
            .filter_map(|(name, present)| present.then_some(name))
            .collect()
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("hooks", &self.hook_names())
            .finish()
    }
}
