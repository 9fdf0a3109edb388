//! In-Memory Backend Module
//!
//! Process-local entry storage behind a read-write lock. Nothing survives
//! the process; useful for tests and for sharing computed results between
//! threads without touching disk.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backend::StorageBackend;
use crate::entry::{CacheEntry, Metadata};
use crate::error::StorageError;

// == Memory Backend ==
/// Entry storage in a process-local map.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryBackend {
    // == Constructor ==
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of stored entries.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageBackend for MemoryBackend {
    fn put(&self, key: &str, entry: &CacheEntry) -> Result<(), StorageError> {
        self.write().insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>, StorageError> {
        Ok(self.read().get(key).cloned())
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.read().contains_key(key))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.write().remove(key);
        Ok(())
    }

    fn touch(&self, key: &str, metadata: &Metadata) -> Result<(), StorageError> {
        if let Some(entry) = self.write().get_mut(key) {
            entry.metadata = metadata.clone();
        }
        Ok(())
    }

    fn scan(&self) -> Result<Vec<(String, Metadata)>, StorageError> {
        Ok(self
            .read()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.metadata.clone()))
            .collect())
    }
}
