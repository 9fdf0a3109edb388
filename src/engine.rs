//! Cache Engine Module
//!
//! Orchestrates key derivation, storage, expiration and per-key locking into
//! the hit / stale / miss flow.
//!
//! One engine owns its settings, its backend, its per-key lock table and its
//! counters; it is built once and shared by reference across threads. Within
//! a process at most one computation runs per key at a time: peers of an
//! in-flight computation block and are then served its stored result.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::{self, StorageBackend};
use crate::config::Settings;
use crate::entry::{CacheEntry, CachedResult, Metadata};
use crate::error::{CacheError, ExecuteError, Result, StorageError};
use crate::expire;
use crate::key::{build_key, CacheKey, FnCall};
use crate::stats::{EngineStats, StatsSnapshot};

/// Lock-table size above which guards without an in-flight computation are
/// dropped.
const LOCK_TABLE_PRUNE_THRESHOLD: usize = 1024;

// == Probe Outcome ==
/// What one storage lookup found.
enum Probe<T> {
    /// A valid entry, already decoded and counted as a hit.
    Hit(CachedResult<T>),
    /// An entry exists but is expired; its metadata seeds the refresh.
    Stale(Metadata),
    /// Nothing stored (or a corrupt document that was healed away).
    Absent,
}

// == Cache Engine ==
/// A configured cache instance.
pub struct CacheEngine {
    settings: Settings,
    backend: Box<dyn StorageBackend>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    stats: EngineStats,
}

impl CacheEngine {
    // == Constructor ==
    /// Opens the backend selected by the settings and builds an engine
    /// around it.
    pub fn new(settings: Settings) -> Result<Self> {
        let backend = backend::open(&settings)?;
        info!("Cache engine ready ({:?} backend)", settings.backend);
        Ok(Self::with_backend(settings, backend))
    }

    /// Builds an engine around a caller-supplied backend.
    pub fn with_backend(settings: Settings, backend: Box<dyn StorageBackend>) -> Self {
        Self {
            settings,
            backend,
            locks: Mutex::new(HashMap::new()),
            stats: EngineStats::new(),
        }
    }

    /// The engine's configuration.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Current counter values.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    // == Execute ==
    /// Serves `call` from the cache, or computes and stores the result.
    ///
    /// The flow per call: derive the key, look the entry up, validate it
    /// against the expiration policy. A valid entry is returned without
    /// invoking `compute`. Otherwise `compute` runs under the per-key lock
    /// and its result is persisted before being returned.
    ///
    /// A failure to persist does not fail the call: the computed value is
    /// returned with the error deferred on
    /// [`write_error`](CachedResult::write_error).
    pub fn execute<T, F>(&self, call: &FnCall, compute: F) -> Result<CachedResult<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        match self.try_execute(call, || Ok::<_, Infallible>(compute())) {
            Ok(result) => Ok(result),
            Err(ExecuteError::Cache(err)) => Err(err),
            Err(ExecuteError::Compute(never)) => match never {},
        }
    }

    // == Try Execute ==
    /// Like [`execute`](CacheEngine::execute) for fallible computations.
    ///
    /// An `Err` from `compute` is passed through unchanged as
    /// [`ExecuteError::Compute`]; nothing is stored for that call.
    pub fn try_execute<T, E, F>(
        &self,
        call: &FnCall,
        compute: F,
    ) -> std::result::Result<CachedResult<T>, ExecuteError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let key = build_key(call, self.settings.key_parameters.as_deref())
            .map_err(CacheError::from)?;

        // Fast path: serve a valid entry without taking the key lock.
        match self.probe(&key)? {
            Probe::Hit(hit) => return Ok(hit),
            Probe::Stale(_) | Probe::Absent if self.settings.cache_only => {
                self.stats.record_miss();
                debug!("Cache-only lookup failed for '{}'", key);
                return Err(CacheError::Miss(key.to_string()).into());
            }
            _ => {}
        }

        let guard = self.key_lock(&key);
        let _held = guard.lock().unwrap_or_else(PoisonError::into_inner);

        // Re-check under the lock: a peer may have stored this entry while
        // we waited, and its fresh result serves this call too.
        let previous = match self.probe(&key)? {
            Probe::Hit(hit) => return Ok(hit),
            Probe::Stale(metadata) => Some(metadata),
            Probe::Absent => None,
        };
        if previous.is_some() {
            self.stats.record_stale_refresh();
            debug!("Stale entry for '{}'; recomputing", key);
        } else {
            self.stats.record_miss();
            debug!("Cache miss for '{}'; computing", key);
        }

        let value = compute().map_err(ExecuteError::Compute)?;

        let now = Utc::now();
        let metadata = match previous {
            Some(old) => old.refreshed(now),
            None => Metadata::new(now),
        };
        Ok(self.store(&key, value, metadata))
    }

    // == Contains ==
    /// Whether a valid entry is stored for `call`.
    pub fn contains(&self, call: &FnCall) -> Result<bool> {
        let key = build_key(call, self.settings.key_parameters.as_deref())?;
        match self.backend.get(key.as_str())? {
            Some(entry) => Ok(self.is_valid_now(&entry.metadata)),
            None => Ok(false),
        }
    }

    // == Evict ==
    /// Removes the entry for `call`. Absent entries are a no-op.
    pub fn evict(&self, call: &FnCall) -> Result<()> {
        let key = build_key(call, self.settings.key_parameters.as_deref())?;
        if self.backend.exists(key.as_str())? {
            self.backend.delete(key.as_str())?;
            self.stats.record_eviction();
            debug!("Evicted entry '{}'", key);
        }
        Ok(())
    }

    // == Touch ==
    /// Moves the entry's `updated_at` to now, postponing a last-update
    /// expiration. Absent entries are a no-op.
    pub fn touch(&self, call: &FnCall) -> Result<()> {
        let key = build_key(call, self.settings.key_parameters.as_deref())?;
        if let Some(entry) = self.backend.get(key.as_str())? {
            self.backend
                .touch(key.as_str(), &entry.metadata.refreshed(Utc::now()))?;
        }
        Ok(())
    }

    // == Purge Expired ==
    /// Removes every stored entry that is invalid under the engine's policy.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut removed = 0;
        for (key, metadata) in self.backend.scan()? {
            if !expire::is_valid(
                &metadata,
                now,
                &self.settings.expiration,
                self.settings.time_check,
            ) {
                self.backend.delete(&key)?;
                self.stats.record_eviction();
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Purge removed {} expired entries", removed);
        } else {
            debug!("Purge found no expired entries");
        }
        Ok(removed)
    }

    // == Lookup ==
    /// One storage lookup: loads, validates and decodes the entry for `key`.
    ///
    /// Read and decoding failures follow the corruption contract: strict
    /// mode surfaces them, otherwise the entry is reported absent (an
    /// undecodable document is also deleted) and the caller recomputes.
    fn probe<T>(&self, key: &CacheKey) -> Result<Probe<T>>
    where
        T: DeserializeOwned,
    {
        let entry = match self.backend.get(key.as_str()) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(Probe::Absent),
            Err(err) if self.settings.strict_corruption => return Err(err.into()),
            Err(err) => {
                warn!("Failed to read entry '{}' ({}); recomputing", key, err);
                return Ok(Probe::Absent);
            }
        };

        let now = Utc::now();
        if !expire::is_valid(
            &entry.metadata,
            now,
            &self.settings.expiration,
            self.settings.time_check,
        ) {
            return Ok(Probe::Stale(entry.metadata));
        }

        let attach = self.attach_metadata(&entry.value);
        let mut metadata = entry.metadata;
        match serde_json::from_value::<T>(entry.value) {
            Ok(value) => {
                let mut write_error = None;
                if self.settings.refresh_on_hit {
                    metadata = metadata.refreshed(now);
                    if let Err(err) = self.backend.touch(key.as_str(), &metadata) {
                        warn!("Failed to refresh '{}' on hit: {}", key, err);
                        self.stats.record_write_failure();
                        write_error = Some(err);
                    }
                }
                self.stats.record_hit();
                debug!("Cache hit for '{}'", key);
                Ok(Probe::Hit(CachedResult {
                    value,
                    metadata: attach.then_some(metadata),
                    from_cache: true,
                    write_error,
                }))
            }
            Err(err) if self.settings.strict_corruption => Err(StorageError::Corrupt {
                key: key.to_string(),
                reason: err.to_string(),
            }
            .into()),
            Err(err) => {
                warn!(
                    "Stored value for '{}' does not decode as the requested type ({}); recomputing",
                    key, err
                );
                if let Err(err) = self.backend.delete(key.as_str()) {
                    warn!("Failed to drop undecodable entry '{}': {}", key, err);
                }
                Ok(Probe::Absent)
            }
        }
    }

    // == Store ==
    /// Persists a freshly computed value, deferring any write failure.
    fn store<T: Serialize>(&self, key: &CacheKey, value: T, metadata: Metadata) -> CachedResult<T> {
        let (canonical, mut write_error) = match serde_json::to_value(&value) {
            Ok(canonical) => (Some(canonical), None),
            Err(err) => (
                None,
                Some(StorageError::Encode {
                    key: key.to_string(),
                    source: err,
                }),
            ),
        };

        let mut attach = false;
        if let Some(canonical) = canonical {
            attach = self.attach_metadata(&canonical);
            let entry = CacheEntry::new(metadata.clone(), canonical);
            if let Err(err) = self.backend.put(key.as_str(), &entry) {
                write_error = Some(err);
            }
        }
        if let Some(err) = &write_error {
            self.stats.record_write_failure();
            warn!("Failed to persist computed value for '{}': {}", key, err);
        }

        CachedResult {
            value,
            metadata: attach.then_some(metadata),
            from_cache: false,
            write_error,
        }
    }

    /// Applies the engine's expiration policy at the current time.
    fn is_valid_now(&self, metadata: &Metadata) -> bool {
        expire::is_valid(
            metadata,
            Utc::now(),
            &self.settings.expiration,
            self.settings.time_check,
        )
    }

    // == Metadata Attachment ==
    /// Whether metadata accompanies a value of this shape.
    ///
    /// Containers (objects, arrays) follow `return_metadata_as_member`
    /// alone; primitives additionally require
    /// `return_metadata_on_primitives`.
    fn attach_metadata(&self, value: &Value) -> bool {
        if !self.settings.return_metadata_as_member {
            return false;
        }
        match value {
            Value::Object(_) | Value::Array(_) => true,
            _ => self.settings.return_metadata_on_primitives,
        }
    }

    // == Key Lock ==
    /// The per-key guard serializing computations for one key.
    fn key_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if table.len() > LOCK_TABLE_PRUNE_THRESHOLD {
            // A strong count of one means no thread holds the guard.
            table.retain(|_, guard| Arc::strong_count(guard) > 1);
        }
        table
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
