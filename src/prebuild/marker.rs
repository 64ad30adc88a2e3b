//! External-import classification and output path rewriting
//!
//! Bare imports matching a prebuild pattern are marked external and
//! recorded; everything else defers to the host configuration's own
//! external rule. Recorded ids are later rewritten to point at their
//! prebuilt bundle.

use crate::build::{ExternalRule, OutputPaths, Pattern};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Prebuild candidates seen during one build. Only grows.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredDependencies {
    ids: Arc<Mutex<BTreeSet<String>>>,
}

impl DiscoveredDependencies {
    pub fn insert(&self, id: &str) {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        if !ids.contains(id) {
            ids.insert(id.to_string());
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    /// Snapshot of the recorded ids in lexicographic order
    pub fn sorted(&self) -> Vec<String> {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decides which imports are prebuilt and where they are imported from
#[derive(Debug)]
pub struct ExternalMarker {
    patterns: Vec<Pattern>,
    fallback: ExternalRule,
    discovered: DiscoveredDependencies,
    prebuild_dir: String,
    extension: String,
}

impl ExternalMarker {
    /// `fallback` is the host configuration's original external rule
    pub fn new(
        patterns: Vec<Pattern>,
        fallback: ExternalRule,
        prebuild_dir: &str,
        extension: &str,
    ) -> Self {
        Self {
            patterns,
            fallback,
            discovered: DiscoveredDependencies::default(),
            prebuild_dir: prebuild_dir.trim_end_matches('/').to_string(),
            extension: extension.to_string(),
        }
    }

    pub fn discovered(&self) -> &DiscoveredDependencies {
        &self.discovered
    }

    /// Whether the import `id` should be left out of the bundle
    pub fn should_be_external(&self, id: &str, importer: Option<&str>, is_resolved: bool) -> bool {
        if !is_path_like(id) && self.patterns.iter().any(|p| p.matches(id)) {
            self.discovered.insert(id);
            return true;
        }
        self.fallback.is_external(id, importer, is_resolved)
    }

    /// Import path emitted for `id` in the main build's output
    ///
    /// Explicit mappings in the host configuration always win.
    pub fn resolve_output_path(&self, id: &str, original: &OutputPaths) -> String {
        if let Some(path) = original.lookup(id) {
            return path;
        }
        if self.discovered.contains(id) {
            return format!("{}/{}.bundle.{}", self.prebuild_dir, id, self.extension);
        }
        id.to_string()
    }
}

/// Relative or absolute filesystem import, as opposed to a package import
fn is_path_like(id: &str) -> bool {
    id.starts_with('.') || id.starts_with('/') || Path::new(id).is_absolute()
}
