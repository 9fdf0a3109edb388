//! Engine Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and refreshes.
//! Counters are atomic so a shared engine can record from any thread.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Engine Stats ==
/// Lock-free performance counters owned by the engine.
#[derive(Debug, Default)]
pub struct EngineStats {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_refreshes: AtomicU64,
    evictions: AtomicU64,
    write_failures: AtomicU64,
}

impl EngineStats {
    // == Constructor ==
    /// Creates counters starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Hit ==
    /// A lookup served from storage.
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Miss ==
    /// A lookup that found no entry.
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Stale Refresh ==
    /// A lookup that found only an expired entry.
    pub(crate) fn record_stale_refresh(&self) {
        self.stale_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Eviction ==
    /// An entry removed by `evict` or `purge_expired`.
    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Write Failure ==
    /// A computed value that could not be persisted.
    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_refreshes: self.stale_refreshes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

// == Stats Snapshot ==
/// Counter values at one observation point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Lookups served from storage
    pub hits: u64,
    /// Lookups that found no entry
    pub misses: u64,
    /// Lookups that found only an expired entry
    pub stale_refreshes: u64,
    /// Entries removed by eviction or purge
    pub evictions: u64,
    /// Computed values that could not be persisted
    pub write_failures: u64,
}

impl StatsSnapshot {
    // == Hit Rate ==
    /// Hits over all lookups (hits, misses and stale refreshes), or 0.0
    /// before any lookup happened.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses + self.stale_refreshes;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_start_at_zero() {
        let snapshot = EngineStats::new().snapshot();
        assert_eq!(snapshot, StatsSnapshot::default());
    }

    #[test]
    fn test_hit_rate_no_lookups() {
        let stats = EngineStats::new();
        assert_eq!(stats.snapshot().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_all_hits() {
        let stats = EngineStats::new();
        stats.record_hit();
        stats.record_hit();
        assert_eq!(stats.snapshot().hit_rate(), 1.0);
    }

    #[test]
    fn test_hit_rate_counts_stale_as_lookup() {
        let stats = EngineStats::new();
        stats.record_hit();
        stats.record_miss();
        stats.record_stale_refresh();
        stats.record_stale_refresh();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hit_rate(), 0.25);
        assert_eq!(snapshot.stale_refreshes, 2);
    }

    #[test]
    fn test_counters_accumulate() {
        let stats = EngineStats::new();
        stats.record_eviction();
        stats.record_eviction();
        stats.record_write_failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.evictions, 2);
        assert_eq!(snapshot.write_failures, 1);
    }

    #[test]
    fn test_recording_from_threads() {
        let stats = EngineStats::new();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        stats.record_hit();
                    }
                });
            }
        });
        assert_eq!(stats.snapshot().hits, 400);
    }
}
