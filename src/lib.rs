//! Memocache - A function-result caching library
//!
//! Memoizes expensive function calls across runs: results are stored under a
//! stable key derived from the function identity and its named arguments,
//! validated against an expiration policy, and served from a pluggable
//! storage backend.

pub mod backend;
pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod expire;
pub mod key;
pub mod stats;


// Re-export public types
pub use backend::StorageBackend;
pub use config::{Settings, StorageKind};
pub use engine::CacheEngine;
pub use entry::{CacheEntry, CachedResult, Metadata};
pub use error::{CacheError, ExecuteError, KeyError, Result, StorageError};
pub use expire::{Expiration, TimeCheck};
pub use key::{build_key, CacheKey, FnCall, FunctionId};
pub use stats::StatsSnapshot;

// == Public Constants ==
/// Hex digest characters appended to every cache key
pub const KEY_DIGEST_CHARS: usize = 16;

/// Filename prefix for file-backend cache documents
pub const FILE_PREFIX: &str = "cache_";

/// Filename suffix for file-backend cache documents
pub const FILE_SUFFIX: &str = ".json";
