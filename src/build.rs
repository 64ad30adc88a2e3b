//! Build configuration handed to the host pipeline
//!
//! Only the parts of the host's configuration that caching and prebuilding
//! read or rewrite are modelled here: the plugin list, the external-module
//! rule and the output targets with their path remapping.

use crate::error::{ModcacheError, ModcacheResult};
use crate::plugin::Plugin;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Module id pattern: an exact id or a regular expression
#[derive(Clone)]
pub enum Pattern {
    Exact(String),
    Regex(Regex),
}

impl Pattern {
    pub fn exact(id: impl Into<String>) -> Self {
        Self::Exact(id.into())
    }

    pub fn regex(pattern: &str) -> ModcacheResult<Self> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|source| ModcacheError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn matches(&self, id: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == id,
            Self::Regex(regex) => regex.is_match(id),
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(id) => write!(f, "{:?}", id),
            Self::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(a), Self::Exact(b)) => a == b,
            (Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

/// Serialized form: `"react"` or `{ regex = "^@codemirror/" }`
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PatternRepr {
    Exact(String),
    Regex { regex: String },
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = match self {
            Self::Exact(id) => PatternRepr::Exact(id.clone()),
            Self::Regex(regex) => PatternRepr::Regex {
                regex: regex.as_str().to_string(),
            },
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match PatternRepr::deserialize(deserializer)? {
            PatternRepr::Exact(id) => Ok(Self::Exact(id)),
            PatternRepr::Regex { regex } => Self::regex(&regex).map_err(serde::de::Error::custom),
        }
    }
}

/// `(id, importer, is_resolved) -> external?`
pub type ExternalPredicate = Arc<dyn Fn(&str, Option<&str>, bool) -> bool + Send + Sync>;

/// The host configuration's rule for leaving imports out of the bundle
#[derive(Clone, Default)]
pub enum ExternalRule {
    /// Nothing is external
    #[default]
    Never,
    Predicate(ExternalPredicate),
    /// External if any pattern matches
    Patterns(Vec<Pattern>),
    Single(Pattern),
}

impl ExternalRule {
    pub fn is_external(&self, id: &str, importer: Option<&str>, is_resolved: bool) -> bool {
        match self {
            Self::Never => false,
            Self::Predicate(predicate) => predicate(id, importer, is_resolved),
            Self::Patterns(patterns) => patterns.iter().any(|p| p.matches(id)),
            Self::Single(pattern) => pattern.matches(id),
        }
    }
}

impl fmt::Debug for ExternalRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str("Never"),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
            Self::Patterns(patterns) => f.debug_tuple("Patterns").field(patterns).finish(),
            Self::Single(pattern) => f.debug_tuple("Single").field(pattern).finish(),
        }
    }
}

/// `id -> replacement import path`
pub type PathMapper = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Rewrites of import paths in the generated output
#[derive(Clone, Default)]
pub enum OutputPaths {
    #[default]
    None,
    Map(HashMap<String, String>),
    Function(PathMapper),
}

impl OutputPaths {
    /// Explicit mapping for `id`, if any. Empty mappings count as unset.
    pub fn lookup(&self, id: &str) -> Option<String> {
        let mapped = match self {
            Self::None => None,
            Self::Map(map) => map.get(id).cloned(),
            Self::Function(mapper) => mapper(id),
        };
        mapped.filter(|path| !path.is_empty())
    }
}

impl fmt::Debug for OutputPaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// Output module format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    #[default]
    Es,
    Cjs,
    Iife,
}

/// One output target of a build
#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    /// Single output file
    pub file: Option<PathBuf>,

    /// Output directory (takes precedence over `file`)
    pub dir: Option<PathBuf>,

    pub format: ModuleFormat,

    pub sourcemap: bool,

    pub paths: OutputPaths,
}

impl OutputOptions {
    /// Directory the build writes into
    pub fn target_dir(&self) -> Option<&Path> {
        if let Some(dir) = &self.dir {
            return Some(dir);
        }
        self.file
            .as_deref()
            .map(|file| file.parent().unwrap_or_else(|| Path::new("")))
    }

    /// Import path emitted for `id`
    pub fn import_path(&self, id: &str) -> String {
        self.paths.lookup(id).unwrap_or_else(|| id.to_string())
    }
}

/// Build configuration consumed by the host pipeline
#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    /// Entry module ids
    pub input: Vec<String>,

    pub output: Vec<OutputOptions>,

    pub external: ExternalRule,

    /// Plugins in pipeline order
    pub plugins: Vec<Plugin>,
}

impl BuildConfig {
    /// The single output target, required for prebuilding
    pub fn single_output(&self) -> ModcacheResult<&OutputOptions> {
        match self.output.as_slice() {
            [output] if output.target_dir().is_some() => Ok(output),
            [] | [_] => Err(ModcacheError::OutputTargetMissing),
            outputs => Err(ModcacheError::MultipleOutputTargets(outputs.len())),
        }
    }

    /// Mutable access to the single output target
    pub fn single_output_mut(&mut self) -> ModcacheResult<&mut OutputOptions> {
        self.single_output()?;
        self.output
            .first_mut()
            .ok_or(ModcacheError::OutputTargetMissing)
    }
}
