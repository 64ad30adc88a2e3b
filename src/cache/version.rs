//! Version hashing for cache invalidation
//!
//! Hashes an ordered sequence of byte buffers with SHA256. The build-wide
//! hash covers the well-known dependency manifests of the project followed
//! by any extra watched files; transform versions additionally cover the
//! source text being transformed.

use crate::error::{ModcacheError, ModcacheResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Dependency manifests hashed when present in the project directory
pub const DEFAULT_DEPENDENCY_FILES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
    "pnpm-lock.yaml",
];

/// Incremental hasher over ordered byte buffers
#[derive(Clone, Default)]
pub struct VersionHasher {
    hasher: Sha256,
}

impl VersionHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes
    pub fn update(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        self.hasher.update(data.as_ref());
        self
    }

    /// Append the contents of a file
    pub async fn update_file(&mut self, path: &Path) -> ModcacheResult<&mut Self> {
        let contents = fs::read(path)
            .await
            .map_err(|e| ModcacheError::io(format!("reading dependency file {}", path.display()), e))?;
        self.hasher.update(&contents);
        Ok(self)
    }

    /// Hex digest of everything appended so far
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Default dependency manifests that exist in `project_dir`, in list order
pub fn default_dependency_files(project_dir: &Path) -> Vec<PathBuf> {
    DEFAULT_DEPENDENCY_FILES
        .iter()
        .map(|name| project_dir.join(name))
        .filter(|path| path.is_file())
        .collect()
}

/// Compute the build-wide version hash.
///
/// Inputs are the existing default manifests followed by `extra` in caller
/// order. Relative extra paths are resolved against `project_dir`; a missing
/// extra file is an error since it was asked for explicitly.
pub async fn compute_version_hash(project_dir: &Path, extra: &[PathBuf]) -> ModcacheResult<String> {
    let mut hasher = VersionHasher::new();
    let files = default_dependency_files(project_dir)
        .into_iter()
        .chain(extra.iter().map(|path| project_dir.join(path)));

    for file in files {
        debug!("Hashing dependency file {}", file.display());
        hasher.update_file(&file).await?;
    }

    Ok(hasher.finish())
}

/// Version for content-sensitive entries: the build hash followed by `data`
pub fn content_version(version_hash: &str, data: impl AsRef<[u8]>) -> String {
    let mut hasher = VersionHasher::new();
    hasher.update(version_hash).update(data);
    hasher.finish()
}
