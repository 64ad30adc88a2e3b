//! Package manifest discovery for prebuild candidates
//!
//! A dependency's freshness is the modification time of the `package.json`
//! that owns its entry file. The entry file itself comes from an
//! [`EntryResolver`]; [`NodeModulesResolver`] implements the usual
//! `node_modules` lookup.

use crate::error::{ModcacheError, ModcacheResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::debug;

const PACKAGE_MANIFEST: &str = "package.json";

/// Resolves a bare module id to the file it loads
pub trait EntryResolver: Send + Sync {
    fn resolve_entry(&self, module_id: &str) -> ModcacheResult<PathBuf>;
}

/// Looks `module_id` up in `node_modules` directories from `base_dir` upward
#[derive(Debug, Clone)]
pub struct NodeModulesResolver {
    base_dir: PathBuf,
}

#[derive(Deserialize)]
struct PackageEntry {
    module: Option<String>,
    main: Option<String>,
}

impl NodeModulesResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn package_entry(package_dir: &Path) -> PathBuf {
        let manifest = std::fs::read_to_string(package_dir.join(PACKAGE_MANIFEST))
            .ok()
            .and_then(|content| serde_json::from_str::<PackageEntry>(&content).ok());
        let entry = manifest
            .and_then(|m| m.module.or(m.main))
            .unwrap_or_else(|| "index.js".to_string());
        package_dir.join(entry)
    }
}

impl EntryResolver for NodeModulesResolver {
    fn resolve_entry(&self, module_id: &str) -> ModcacheResult<PathBuf> {
        for dir in self.base_dir.ancestors() {
            let candidate = dir.join("node_modules").join(module_id);
            if candidate.is_file() {
                return Ok(candidate);
            }
            let mut with_ext = candidate.clone().into_os_string();
            with_ext.push(".js");
            let with_ext = PathBuf::from(with_ext);
            if with_ext.is_file() {
                return Ok(with_ext);
            }
            if candidate.is_dir() {
                return Ok(Self::package_entry(&candidate));
            }
        }

        Err(ModcacheError::EntryNotResolved {
            module_id: module_id.to_string(),
        })
    }
}

/// Find the `package.json` owning `entry` by walking up its ancestors.
///
/// The filesystem root itself is not searched.
pub async fn find_package_manifest(module_id: &str, entry: &Path) -> ModcacheResult<PathBuf> {
    let start = entry.parent().unwrap_or(entry);
    let mut dir = start;

    while let Some(parent) = dir.parent() {
        let candidate = dir.join(PACKAGE_MANIFEST);
        if fs::try_exists(&candidate).await.unwrap_or(false) {
            return Ok(candidate);
        }
        dir = parent;
    }

    Err(ModcacheError::PackageManifestNotFound {
        module_id: module_id.to_string(),
        searched_from: start.to_path_buf(),
    })
}

/// Last-modified time of the package manifest that owns `module_id`
pub async fn package_timestamp(module_id: &str, resolver: &dyn EntryResolver) -> ModcacheResult<SystemTime> {
    let entry = resolver.resolve_entry(module_id)?;
    let manifest = find_package_manifest(module_id, &entry).await?;
    debug!("Package manifest for {}: {}", module_id, manifest.display());

    fs::metadata(&manifest)
        .await
        .and_then(|meta| meta.modified())
        .map_err(|source| ModcacheError::PackageTimestamp {
            module_id: module_id.to_string(),
            source,
        })
}
