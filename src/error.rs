//! Error types for modcache
//!
//! All modules use `ModcacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for modcache operations
pub type ModcacheResult<T> = Result<T, ModcacheError>;

/// All errors that can occur in modcache
#[derive(Error, Debug)]
pub enum ModcacheError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid configuration value for {field}: {reason}")]
    ConfigValue { field: &'static str, reason: String },

    #[error("\"output.dir\" or \"output.file\" must be specified in the build config to use prebuilding")]
    OutputTargetMissing,

    #[error("Prebuilding requires exactly one output target, found {0}")]
    MultipleOutputTargets(usize),

    #[error("Invalid prebuild pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    // Prebuild errors
    #[error("Could not resolve an entry file for \"{module_id}\"")]
    EntryNotResolved { module_id: String },

    #[error("No package.json found for \"{module_id}\" (searched upward from {searched_from})")]
    PackageManifestNotFound {
        module_id: String,
        searched_from: PathBuf,
    },

    #[error("Failed to get package version for \"{module_id}\"")]
    PackageTimestamp {
        module_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build bundle for \"{module_id}\": {reason}")]
    Bundle { module_id: String, reason: String },

    // Plugin errors
    #[error("Plugin {plugin} failed in {hook}: {message}")]
    Plugin {
        plugin: String,
        hook: &'static str,
        message: String,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl ModcacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an error raised by a plugin hook
    pub fn plugin(plugin: impl Into<String>, hook: &'static str, message: impl Into<String>) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            hook,
            message: message.into(),
        }
    }

    /// Whether the error was detected while validating configuration,
    /// before any build work started
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid { .. }
                | Self::ConfigNotFound(_)
                | Self::ConfigValue { .. }
                | Self::OutputTargetMissing
                | Self::MultipleOutputTargets(_)
                | Self::InvalidPattern { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::OutputTargetMissing => Some("Set exactly one of output.file or output.dir"),
            Self::MultipleOutputTargets(_) => {
                Some("Split the build into one config per output target")
            }
            Self::InvalidPattern { .. } => Some("Prebuild regex patterns use Rust regex syntax"),
            Self::PackageManifestNotFound { .. } | Self::EntryNotResolved { .. } => {
                Some("Check that the dependency is installed (npm install)")
            }
            _ => None,
        }
    }
}
