//! Compiled template caching.
//!
//! Compiling a template is far more expensive than checking whether its
//! source changed, so the cache keeps one compiled artifact per source file
//! and validates it on every fetch with a metadata read:
//!
//! ```text
//! fetch(file) -> key = canonical path -> lookup
//!                                          |
//!                       +------------------+------------------+
//!                       |                  |                  |
//!                   no entry        snapshot differs    snapshot equal
//!                       |                  |                  |
//!                       +-------> compile, replace entry      |
//!                                          |                  |
//!                                          +----> template <--+
//! ```
//!
//! - [`template`]: entries, the cache itself, the fetch algorithm
//! - [`flight`]: per-key locks so concurrent misses compile once
//! - [`preload`]: warm the cache from a template directory

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

pub mod flight;
pub mod preload;
pub mod template;

pub use flight::KeyedLocks;
pub use preload::{PreloadReport, TemplatePreloader};
pub use template::{CacheEntry, TemplateCache, TemplateCacheConfig};

/// Cache metrics for monitoring and diagnostics
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Fetches served from a valid entry
    pub hits: AtomicU64,
    /// Fetches that found no valid entry
    pub misses: AtomicU64,
    /// Misses caused by a changed source file
    pub stale: AtomicU64,
    /// Misses satisfied by another caller's compile
    pub coalesced: AtomicU64,
    /// Successful compilations
    pub compilations: AtomicU64,
    /// Failed reads or compilations
    pub compile_failures: AtomicU64,
    /// Entries dropped to stay under capacity
    pub evictions: AtomicU64,
    /// Entries removed explicitly
    pub invalidations: AtomicU64,
    /// Current number of entries
    pub entries: AtomicUsize,
}

impl CacheMetrics {
    /// Create new metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cache hit
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a miss caused by a stale snapshot
    pub fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a miss resolved by waiting on another compile
    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a compilation
    pub fn record_compilation(&self) {
        self.compilations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed compilation
    pub fn record_compile_failure(&self) {
        self.compile_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an eviction
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an invalidation
    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }

    /// Reset all counters except the entry count
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.stale.store(0, Ordering::Relaxed);
        self.coalesced.store(0, Ordering::Relaxed);
        self.compilations.store(0, Ordering::Relaxed);
        self.compile_failures.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
    }

    /// Get summary as a string
    pub fn summary(&self) -> String {
        format!(
            "Templates: {}, Hits: {}, Misses: {} ({} stale), Hit Rate: {:.2}%, Compilations: {}, Failures: {}, Evictions: {}",
            self.entries.load(Ordering::Relaxed),
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.stale.load(Ordering::Relaxed),
            self.hit_rate() * 100.0,
            self.compilations.load(Ordering::Relaxed),
            self.compile_failures.load(Ordering::Relaxed),
            self.evictions.load(Ordering::Relaxed),
        )
    }
}

/// Point-in-time view of a cache, served by the stats endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatus {
    /// Engine compiling the templates
    pub engine: String,
    /// Number of cached templates
    pub entries: usize,
    /// Capacity (0 = unbounded)
    pub max_templates: usize,
    /// Whether concurrent misses are coalesced
    pub single_flight: bool,
    /// Hit count
    pub hits: u64,
    /// Miss count
    pub misses: u64,
    /// Misses caused by changed sources
    pub stale: u64,
    /// Misses resolved by another caller's compile
    pub coalesced: u64,
    /// Successful compilations
    pub compilations: u64,
    /// Failed compilations
    pub compile_failures: u64,
    /// Evictions
    pub evictions: u64,
    /// Hit rate (0.0 to 1.0)
    pub hit_rate: f64,
}
