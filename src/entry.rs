//! Cache Entry Module
//!
//! The stored envelope (metadata plus serialized value) and the result
//! wrapper handed back to callers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;

// == Metadata ==
/// Per-entry bookkeeping stored alongside the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// When the entry was first written. Immutable for the life of the entry.
    pub created_at: DateTime<Utc>,
    /// When the entry was last written or touched.
    pub updated_at: DateTime<Utc>,
    /// Caller-defined extension fields; round-trip through storage untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl Metadata {
    // == Constructor ==
    /// Metadata for a brand-new entry: both timestamps set to `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            extra: BTreeMap::new(),
        }
    }

    // == Refreshed ==
    /// Metadata for an overwrite or touch: `created_at` carried over,
    /// `updated_at` moved to `now`.
    pub fn refreshed(&self, now: DateTime<Utc>) -> Self {
        Self {
            created_at: self.created_at,
            updated_at: now,
            extra: self.extra.clone(),
        }
    }

    /// Sets one extension field.
    pub fn with_extra(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }
}

// == Cache Entry ==
/// The stored envelope: metadata plus the value in its canonical JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub metadata: Metadata,
    pub value: Value,
}

impl CacheEntry {
    /// Creates an envelope ready for storage.
    pub fn new(metadata: Metadata, value: Value) -> Self {
        Self { metadata, value }
    }
}

// == Cached Result ==
/// What a cached call hands back: the value plus explicit cache context.
///
/// Replaces attaching bookkeeping to the value itself; callers that only
/// want the value use [`into_value`](CachedResult::into_value).
#[derive(Debug)]
pub struct CachedResult<T> {
    /// The returned value, computed or loaded from storage.
    pub value: T,
    /// Entry metadata, when the settings attach it.
    pub metadata: Option<Metadata>,
    /// True when the value came from storage rather than the computation.
    pub from_cache: bool,
    /// A deferred write failure: the value is good, persisting it was not.
    pub write_error: Option<StorageError>,
}

impl<T> CachedResult<T> {
    /// Discards the cache context and keeps the value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Transforms the value, keeping the cache context.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CachedResult<U> {
        CachedResult {
            value: f(self.value),
            metadata: self.metadata,
            from_cache: self.from_cache,
            write_error: self.write_error,
        }
    }
}
