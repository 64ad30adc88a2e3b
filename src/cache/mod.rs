//! Persistent versioned caches for pipeline hooks
//!
//! Each cached plugin owns one [`CacheStore`], a JSON document mapping
//! cache keys to `{ version, value }` entries. An entry is only returned
//! when its stored version equals the version the caller asks for, so
//! invalidation is expressed entirely through version strings:
//!
//! | Hook | Key | Version |
//! |------|-----|---------|
//! | resolve_module | `resolveModule:<id>,<importer json>` | `default` |
//! | load_module | `loadModule:<id>` | `default` |
//! | transform_module | `transformModule:<id>` | hash(build hash + source) |
//!
//! The importer is written as a JSON value (`"src/a.js"` or `null`) so a
//! missing importer and an empty one get different keys.
//!
//! The build-wide version hash from [`compute_version_hash`] is folded
//! into the cache directory, so any change to a watched dependency file
//! moves every store to a fresh namespace.

pub mod store;
pub mod version;

pub use store::{read_document, CacheDocument, CacheEntry, CacheStore};
pub use version::{
    compute_version_hash, content_version, default_dependency_files, VersionHasher,
    DEFAULT_DEPENDENCY_FILES,
};
