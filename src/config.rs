//! Configuration Module
//!
//! The settings surface for cache engines: storage selection, expiration
//! policy, key filtering, and result-wrapping behavior.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ParseError;
use crate::expire::{Expiration, TimeCheck};

// == Storage Kind ==
/// Which storage backend an engine opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    /// One JSON document per key under the cache directory (default).
    #[default]
    File,
    /// Process-local map; nothing persisted.
    Memory,
    /// Embedded LMDB database under the cache directory.
    Lmdb,
}

impl FromStr for StorageKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageKind::File),
            "memory" => Ok(StorageKind::Memory),
            "lmdb" => Ok(StorageKind::Lmdb),
            _ => Err(ParseError::new("storage backend", s)),
        }
    }
}

// == Settings ==
/// Cache engine configuration.
///
/// Immutable once an engine is built from it; one value may configure many
/// cached functions.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Storage backend to open
    pub backend: StorageKind,
    /// Root directory for persistent backends
    pub cache_dir: PathBuf,
    /// Validity bound for stored entries
    pub expiration: Expiration,
    /// When set, only these named arguments participate in cache keys
    pub key_parameters: Option<Vec<String>>,
    /// Which metadata timestamp anchors a relative expiration
    pub time_check: TimeCheck,
    /// Attach metadata to results whose values are JSON containers
    pub return_metadata_as_member: bool,
    /// Additionally attach metadata when the value is a JSON primitive
    pub return_metadata_on_primitives: bool,
    /// Never recompute: a lookup that cannot be served from storage fails
    pub cache_only: bool,
    /// Refresh `updated_at` on every hit (sliding expiration)
    pub refresh_on_hit: bool,
    /// Surface corrupt stored documents as errors instead of self-healing
    pub strict_corruption: bool,
    /// Memory-map size for the LMDB backend, in megabytes
    pub lmdb_map_size_mb: usize,
}

impl Settings {
    /// Creates settings by loading values from environment variables.
    ///
    /// Unset or unparseable variables fall back to the defaults.
    ///
    /// # Environment Variables
    /// - `MEMOCACHE_BACKEND` - `file`, `memory` or `lmdb` (default: file)
    /// - `MEMOCACHE_DIR` - Cache root directory (default: `<tmp>/memocache`)
    /// - `MEMOCACHE_EXPIRATION` - e.g. `never`, `300`, `12 hours` (default: never)
    /// - `MEMOCACHE_TIME_CHECK` - `creation` or `last_update` (default: last_update)
    /// - `MEMOCACHE_CACHE_ONLY` - `true` or `false` (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend: env::var("MEMOCACHE_BACKEND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.backend),
            cache_dir: env::var("MEMOCACHE_DIR")
                .ok()
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            expiration: env::var("MEMOCACHE_EXPIRATION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.expiration),
            time_check: env::var("MEMOCACHE_TIME_CHECK")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.time_check),
            cache_only: env::var("MEMOCACHE_CACHE_ONLY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_only),
            ..Self::default()
        }
    }

    // == Builder Methods ==
    /// Selects the storage backend.
    pub fn with_backend(mut self, backend: StorageKind) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the root directory for persistent backends.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Sets the expiration bound.
    pub fn with_expiration(mut self, expiration: Expiration) -> Self {
        self.expiration = expiration;
        self
    }

    /// Restricts cache keys to the named arguments.
    pub fn with_key_parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_parameters = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Selects the expiration anchor.
    pub fn with_time_check(mut self, time_check: TimeCheck) -> Self {
        self.time_check = time_check;
        self
    }

    /// Attach or withhold metadata on container values.
    pub fn with_metadata_as_member(mut self, attach: bool) -> Self {
        self.return_metadata_as_member = attach;
        self
    }

    /// Attach metadata on primitive values as well.
    pub fn with_metadata_on_primitives(mut self, attach: bool) -> Self {
        self.return_metadata_on_primitives = attach;
        self
    }

    /// Forbid recomputation: lookups must be served from storage.
    pub fn with_cache_only(mut self, cache_only: bool) -> Self {
        self.cache_only = cache_only;
        self
    }

    /// Refresh `updated_at` on every hit.
    pub fn with_refresh_on_hit(mut self, refresh: bool) -> Self {
        self.refresh_on_hit = refresh;
        self
    }

    /// Surface corrupt stored documents instead of recomputing over them.
    pub fn with_strict_corruption(mut self, strict: bool) -> Self {
        self.strict_corruption = strict;
        self
    }

    /// Sets the LMDB memory-map size in megabytes.
    pub fn with_lmdb_map_size_mb(mut self, megabytes: usize) -> Self {
        self.lmdb_map_size_mb = megabytes;
        self
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: StorageKind::File,
            cache_dir: env::temp_dir().join("memocache"),
            expiration: Expiration::Never,
            key_parameters: None,
            time_check: TimeCheck::LastUpdate,
            return_metadata_as_member: true,
            return_metadata_on_primitives: false,
            cache_only: false,
            refresh_on_hit: false,
            strict_corruption: false,
            lmdb_map_size_mb: 256,
        }
    }
}
