//! Dependency prebuilding
//!
//! Third-party packages matching a prebuild pattern are kept out of the
//! main bundle and imported from standalone bundles in the prebuild
//! directory instead. The bundles are (re)built when the build ends:
//!
//! 1. While the pipeline runs, [`ExternalMarker`] records every matching
//!    bare import and reports it as external.
//! 2. The main output rewrites those imports to
//!    `<prebuild_dir>/<id>.bundle.<ext>`.
//! 3. At build end the recorded ids are timestamped by their
//!    `package.json` and handed to [`BundleBuilder`], which rebuilds the
//!    stale ones.

pub mod bundles;
pub mod marker;
pub mod packages;

pub use bundles::{bundle_path, relative_import_path, BundleBuilder, BundleOptions, BundleOutput, Bundler};
pub use marker::{DiscoveredDependencies, ExternalMarker};
pub use packages::{find_package_manifest, package_timestamp, EntryResolver, NodeModulesResolver};

use crate::build::{BuildConfig, ExternalRule, OutputPaths, Pattern};
use crate::config::{BuildMode, CacheSettings};
use crate::error::{ModcacheError, ModcacheResult};
use crate::plugin::{EndHook, Plugin, PluginContext};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Name of the plugin that triggers bundle builds
pub const PREBUILD_PLUGIN_NAME: &str = "modcache:build-external-deps";

/// Settings for prebuilding
#[derive(Debug, Clone)]
pub struct PrebuildOptions {
    /// Bundle directory relative to the build's output directory
    pub prebuild_dir: String,

    pub patterns: Vec<Pattern>,

    pub extension: String,

    pub mode: BuildMode,

    pub concurrency: usize,
}

impl PrebuildOptions {
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            prebuild_dir: settings.prebuild_dir.clone(),
            patterns: settings.prebuild.clone(),
            extension: settings.bundle_extension.clone(),
            mode: settings.mode,
            concurrency: settings.prebuild_concurrency,
        }
    }
}

/// Builds the bundles for the dependencies discovered during a build
pub struct Prebuilder {
    marker: Arc<ExternalMarker>,
    builder: BundleBuilder,
    resolver: Arc<dyn EntryResolver>,
    output_dir: PathBuf,
}

impl Prebuilder {
    /// Absolute directory the bundles are written to
    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }

    pub fn marker(&self) -> &ExternalMarker {
        &self.marker
    }

    /// Timestamp every discovered dependency and rebuild the stale bundles.
    ///
    /// A dependency whose package.json cannot be found aborts the whole step.
    pub async fn run(&self) -> ModcacheResult<Vec<BundleOutput>> {
        let dependencies = self.marker.discovered().sorted();
        debug!("Discovered {} prebuild dependencies", dependencies.len());

        let mut timestamps = BTreeMap::new();
        for id in dependencies {
            let timestamp = package_timestamp(&id, self.resolver.as_ref()).await?;
            timestamps.insert(id, timestamp);
        }

        self.builder.build(&timestamps, &self.output_dir).await
    }
}

struct BuildExternalDeps {
    prebuilder: Arc<Prebuilder>,
}

#[async_trait]
impl EndHook for BuildExternalDeps {
    async fn end(&self, _ctx: &dyn PluginContext, _error: Option<&ModcacheError>) -> ModcacheResult<()> {
        self.prebuilder.run().await.map(|_| ())
    }
}

/// Wire prebuilding into `build_config`.
///
/// Replaces the external rule and output path mapping (both fall back to
/// the originals) and appends a plugin whose `end` hook builds the bundles.
/// Fails before any work is done unless the build has exactly one output
/// target.
pub fn add_prebuilding(
    build_config: BuildConfig,
    options: PrebuildOptions,
    bundler: Arc<dyn Bundler>,
    resolver: Arc<dyn EntryResolver>,
) -> ModcacheResult<BuildConfig> {
    let (config, _) = prebuilding_config(build_config, options, bundler, resolver)?;
    Ok(config)
}

/// [`add_prebuilding`], also returning the [`Prebuilder`] driving the end hook
pub fn prebuilding_config(
    mut build_config: BuildConfig,
    options: PrebuildOptions,
    bundler: Arc<dyn Bundler>,
    resolver: Arc<dyn EntryResolver>,
) -> ModcacheResult<(BuildConfig, Arc<Prebuilder>)> {
    let target_dir = build_config
        .single_output()?
        .target_dir()
        .ok_or(ModcacheError::OutputTargetMissing)?
        .to_path_buf();
    let output_dir = std::path::absolute(target_dir.join(&options.prebuild_dir)).map_err(|e| {
        ModcacheError::io(format!("resolving prebuild directory {}", options.prebuild_dir), e)
    })?;

    let marker = Arc::new(ExternalMarker::new(
        options.patterns,
        std::mem::take(&mut build_config.external),
        &options.prebuild_dir,
        &options.extension,
    ));

    let external_marker = Arc::clone(&marker);
    build_config.external = ExternalRule::Predicate(Arc::new(move |id, importer, is_resolved| {
        external_marker.should_be_external(id, importer, is_resolved)
    }));

    let output = build_config.single_output_mut()?;
    let original_paths = std::mem::take(&mut output.paths);
    let path_marker = Arc::clone(&marker);
    output.paths = OutputPaths::Function(Arc::new(move |id| {
        Some(path_marker.resolve_output_path(id, &original_paths))
    }));

    let prebuilder = Arc::new(Prebuilder {
        marker,
        builder: BundleBuilder::new(bundler, &options.extension, options.mode, options.concurrency),
        resolver,
        output_dir,
    });

    build_config.plugins.push(Plugin::new(PREBUILD_PLUGIN_NAME).with_end(BuildExternalDeps {
        prebuilder: Arc::clone(&prebuilder),
    }));

    Ok((build_config, prebuilder))
}
