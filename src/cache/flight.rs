//! Per-key mutual exclusion for compiles.
//!
//! Only callers working on the same key wait for each other. Lock entries
//! are created on demand and removed again once nobody holds them.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// A table of lazily created per-key locks.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with_lock<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let lock = Arc::clone(&*self.locks.entry(key.to_string()).or_default());
        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);
        // Only the table's own reference left: nobody is waiting.
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Number of keys currently locked or waited on
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }
}
