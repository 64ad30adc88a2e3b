//! Standalone bundles for prebuilt dependencies
//!
//! Every dependency in a batch is bundled on its own. The other ids of the
//! batch are kept external and their imports rewritten to the sibling
//! bundle's relative path, so a package shared by several prebuilt
//! dependencies is loaded from one bundle instead of being inlined into each.

use crate::build::ModuleFormat;
use crate::config::BuildMode;
use crate::error::{ModcacheError, ModcacheResult};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info};

/// Code expression replaced with the build mode in every bundle
pub const ENV_MARKER: &str = "process.env.NODE_ENV";

/// Options for building one dependency bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOptions {
    /// Module id of the dependency (the bundle's entry point)
    pub input: String,

    pub output_file: PathBuf,

    pub format: ModuleFormat,

    pub sourcemap: bool,

    /// Ids left out of the bundle
    pub external: Vec<String>,

    /// Import path rewrites for the external ids
    pub paths: BTreeMap<String, String>,

    /// Code expressions replaced with literal values
    pub replacements: BTreeMap<String, String>,

    /// Resolve bare imports through node_modules and inline them
    pub node_resolve: bool,

    /// Convert CommonJS modules to ES modules
    pub commonjs: bool,
}

/// Builds and writes a single bundle
#[async_trait]
pub trait Bundler: Send + Sync {
    async fn bundle(&self, options: &BundleOptions) -> ModcacheResult<()>;
}

/// One bundle written by [`BundleBuilder::build`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOutput {
    pub dependency_id: String,
    pub output_path: PathBuf,

    /// Every id of the batch, used for cross-bundle import paths
    pub peer_ids: Vec<String>,
}

/// `{dir}/{id}.bundle.{ext}`
pub fn bundle_path(dir: &Path, id: &str, extension: &str) -> PathBuf {
    dir.join(format!("{}.bundle.{}", id, extension))
}

/// Relative path from the bundle at `from` to the bundle at `to`, usable
/// as an import specifier
pub fn relative_import_path(from: &Path, to: &Path) -> String {
    let from_dir = from.parent().unwrap_or_else(|| Path::new(""));
    let relative = pathdiff::diff_paths(to, from_dir).unwrap_or_else(|| to.to_path_buf());
    let relative = relative.to_string_lossy().replace('\\', "/");
    if relative.starts_with('.') {
        relative
    } else {
        format!("./{}", relative)
    }
}

/// Rebuilds stale dependency bundles
#[derive(Clone)]
pub struct BundleBuilder {
    bundler: Arc<dyn Bundler>,
    extension: String,
    mode: BuildMode,
    concurrency: usize,
}

impl BundleBuilder {
    pub fn new(bundler: Arc<dyn Bundler>, extension: &str, mode: BuildMode, concurrency: usize) -> Self {
        Self {
            bundler,
            extension: extension.to_string(),
            mode,
            concurrency: concurrency.max(1),
        }
    }

    /// Ids whose bundle in `dir` is missing or older than their timestamp
    pub async fn stale_dependencies(
        &self,
        dependencies: &BTreeMap<String, SystemTime>,
        dir: &Path,
    ) -> Vec<String> {
        let mut stale = Vec::new();
        for (id, timestamp) in dependencies {
            let output = bundle_path(dir, id, &self.extension);
            let built_at = fs::metadata(&output).await.and_then(|meta| meta.modified());
            match built_at {
                Ok(built_at) if built_at >= *timestamp => {
                    debug!("Bundle for {} is up to date", id);
                }
                _ => stale.push(id.clone()),
            }
        }
        stale
    }

    /// Bundle options for `id` within the batch `peers`
    pub fn bundle_options(&self, id: &str, dir: &Path, peers: &[String]) -> BundleOptions {
        let output_file = bundle_path(dir, id, &self.extension);
        let others: Vec<String> = peers.iter().filter(|peer| *peer != id).cloned().collect();
        let paths = others
            .iter()
            .map(|peer| {
                let target = bundle_path(dir, peer, &self.extension);
                (peer.clone(), relative_import_path(&output_file, &target))
            })
            .collect();

        BundleOptions {
            input: id.to_string(),
            output_file,
            format: ModuleFormat::Es,
            sourcemap: true,
            external: others,
            paths,
            replacements: BTreeMap::from([(
                ENV_MARKER.to_string(),
                format!("\"{}\"", self.mode.as_str()),
            )]),
            node_resolve: true,
            commonjs: true,
        }
    }

    /// Rebuild every stale bundle of `dependencies` into `dir`.
    ///
    /// Does nothing, not even touching `dir`, when all bundles are fresh.
    /// Builds run concurrently; the first failure is returned once all
    /// builds have finished, and bundles already written are kept.
    pub async fn build(
        &self,
        dependencies: &BTreeMap<String, SystemTime>,
        dir: &Path,
    ) -> ModcacheResult<Vec<BundleOutput>> {
        let stale = self.stale_dependencies(dependencies, dir).await;
        if stale.is_empty() {
            debug!("All {} prebuilt bundles are up to date", dependencies.len());
            return Ok(vec![]);
        }

        info!("Building prebuilt bundles: {}", stale.join(", "));
        let peers: Vec<String> = dependencies.keys().cloned().collect();

        let builds = stale.into_iter().map(|id| {
            let options = self.bundle_options(&id, dir, &peers);
            let bundler = Arc::clone(&self.bundler);
            let peer_ids = peers.clone();
            async move {
                if let Some(parent) = options.output_file.parent() {
                    fs::create_dir_all(parent).await.map_err(|e| {
                        ModcacheError::io(format!("creating bundle directory {}", parent.display()), e)
                    })?;
                }
                bundler.bundle(&options).await?;
                debug!("Wrote {}", options.output_file.display());
                Ok::<_, ModcacheError>(BundleOutput {
                    dependency_id: id,
                    output_path: options.output_file,
                    peer_ids,
                })
            }
        });

        let results: Vec<ModcacheResult<BundleOutput>> = stream::iter(builds)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut outputs = results.into_iter().collect::<ModcacheResult<Vec<_>>>()?;
        outputs.sort_by(|a, b| a.dependency_id.cmp(&b.dependency_id));
        Ok(outputs)
    }
}
