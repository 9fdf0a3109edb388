//! Storage Backend Module
//!
//! The persistence seam of the engine: a trait for entry storage, with
//! file-based, in-memory and embedded-database implementations.

mod file;
mod lmdb;
mod memory;

// Re-export public types
pub use file::FileBackend;
pub use lmdb::LmdbBackend;
pub use memory::MemoryBackend;

use crate::config::{Settings, StorageKind};
use crate::entry::{CacheEntry, Metadata};
use crate::error::StorageError;

// == Storage Backend Trait ==
/// Persistence contract for cache entries.
///
/// Implementations are shared across threads and must commit writes
/// atomically: a concurrent reader observes either the previous complete
/// entry or the new complete entry, never a torn one. Concurrent writers
/// race benignly; the last committed write wins.
pub trait StorageBackend: Send + Sync {
    /// Persists an entry under `key`, replacing any previous one.
    fn put(&self, key: &str, entry: &CacheEntry) -> Result<(), StorageError>;

    /// Loads the entry under `key`, or `None` when absent.
    ///
    /// A stored document that cannot be decoded is removed and reported
    /// absent, unless the backend was opened strict, in which case it is a
    /// [`StorageError::Corrupt`].
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, StorageError>;

    /// Whether an entry is stored under `key`, expired or not.
    fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Removes the entry under `key`. Absent keys are a no-op.
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Replaces the metadata of the entry under `key`, leaving the value
    /// untouched. Absent keys are a no-op.
    fn touch(&self, key: &str, metadata: &Metadata) -> Result<(), StorageError>;

    /// Enumerates stored keys with their metadata.
    fn scan(&self) -> Result<Vec<(String, Metadata)>, StorageError>;
}

// == Backend Factory ==
/// Opens the backend selected by the settings.
pub fn open(settings: &Settings) -> Result<Box<dyn StorageBackend>, StorageError> {
    match settings.backend {
        StorageKind::Memory => Ok(Box::new(MemoryBackend::new())),
        StorageKind::File => Ok(Box::new(FileBackend::open(
            &settings.cache_dir,
            settings.strict_corruption,
        )?)),
        StorageKind::Lmdb => Ok(Box::new(LmdbBackend::open(
            &settings.cache_dir,
            settings.lmdb_map_size_mb,
            settings.strict_corruption,
        )?)),
    }
}
