//! Template Caching System
//!
//! One [`CacheEntry`] per canonical source path. An entry pairs the
//! compiled template with the [`FileIdentity`] of the source it was
//! compiled from. On every fetch the file is re-stat'ed; an equal identity
//! returns the cached template without touching the engine, anything else
//! recompiles and replaces the entry.
//!
//! Entries are immutable once built. A replaced entry's template stays
//! alive through its `Arc` for as long as an in-flight render holds it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace, warn};

use super::{CacheMetrics, CacheStatus, KeyedLocks};
use crate::engine::{SharedTemplate, TemplateEngine};
use crate::error::{Error, Result};
use crate::source::{FileIdentity, TemplateFile};

// ============================================================================
// Cache Entry
// ============================================================================

/// A compiled template together with the source snapshot it came from.
pub struct CacheEntry {
    key: String,
    snapshot: FileIdentity,
    template: SharedTemplate,
    compile_time: Duration,
    // Cache bookkeeping for LRU eviction; not part of the entry's identity.
    last_used: AtomicU64,
}

impl CacheEntry {
    /// Create a new entry
    pub fn new(
        key: impl Into<String>,
        snapshot: FileIdentity,
        template: SharedTemplate,
        compile_time: Duration,
    ) -> Self {
        Self {
            key: key.into(),
            snapshot,
            template,
            compile_time,
            last_used: AtomicU64::new(0),
        }
    }

    /// Canonical path this entry is stored under
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Source identity at compile time
    pub fn snapshot(&self) -> FileIdentity {
        self.snapshot
    }

    /// The compiled template
    pub fn template(&self) -> SharedTemplate {
        Arc::clone(&self.template)
    }

    /// Whether the entry still matches the live file
    pub fn is_valid(&self, current: &FileIdentity) -> bool {
        self.snapshot == *current
    }

    /// How long the compile took
    pub fn compile_time(&self) -> Duration {
        self.compile_time
    }

    fn touch(&self, tick: u64) {
        self.last_used.store(tick, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("snapshot", &self.snapshot)
            .field("compile_time", &self.compile_time)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Template Cache Configuration
// ============================================================================

/// Configuration for the template cache
#[derive(Debug, Clone)]
pub struct TemplateCacheConfig {
    /// Maximum number of templates to keep (0 = unbounded)
    pub max_templates: usize,
    /// Compile each key at most once at a time
    pub single_flight: bool,
}

impl Default for TemplateCacheConfig {
    fn default() -> Self {
        Self {
            max_templates: 10_000,
            single_flight: true,
        }
    }
}

impl TemplateCacheConfig {
    /// No capacity limit
    pub fn unbounded() -> Self {
        Self {
            max_templates: 0,
            ..Self::default()
        }
    }
}

// ============================================================================
// Template Cache
// ============================================================================

enum Lookup {
    Hit(SharedTemplate),
    Stale(FileIdentity),
    Missing,
}

/// Staleness-validated cache of compiled templates.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use templet::cache::{TemplateCache, TemplateCacheConfig};
/// use templet::engine::SimpleTemplateEngine;
/// use templet::source::FsTemplateFile;
///
/// let cache = TemplateCache::new(
///     Arc::new(SimpleTemplateEngine::new()),
///     TemplateCacheConfig::default(),
/// );
/// let file = FsTemplateFile::new("templates/greet.tmpl");
/// let first = cache.fetch(&file)?;
/// let second = cache.fetch(&file)?; // same instance while the file is unchanged
/// assert!(Arc::ptr_eq(&first, &second));
/// # Ok::<(), templet::Error>(())
/// ```
pub struct TemplateCache {
    engine: Arc<dyn TemplateEngine>,
    entries: DashMap<String, Arc<CacheEntry>>,
    flights: KeyedLocks,
    config: TemplateCacheConfig,
    metrics: Arc<CacheMetrics>,
    clock: AtomicU64,
}

impl TemplateCache {
    /// Create a cache compiling with `engine`
    pub fn new(engine: Arc<dyn TemplateEngine>, config: TemplateCacheConfig) -> Self {
        Self {
            engine,
            entries: DashMap::with_capacity(config.max_templates.clamp(16, 1000)),
            flights: KeyedLocks::new(),
            config,
            metrics: Arc::new(CacheMetrics::new()),
            clock: AtomicU64::new(0),
        }
    }

    /// The engine templates are compiled with
    pub fn engine(&self) -> &Arc<dyn TemplateEngine> {
        &self.engine
    }

    /// The cache configuration
    pub fn config(&self) -> &TemplateCacheConfig {
        &self.config
    }

    /// Get the cache metrics
    pub fn metrics(&self) -> Arc<CacheMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Get the number of cached templates
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether a key has an entry (valid or not)
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Get the entry stored under a key without validating it
    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.entries.get(key).map(|e| Arc::clone(e.value()))
    }

    /// Remove the entry for a key
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.metrics.record_invalidation();
            self.sync_entry_count();
        }
        removed
    }

    /// Clear all cached templates
    pub fn clear(&self) {
        self.entries.clear();
        self.sync_entry_count();
    }

    /// Snapshot of the cache state
    pub fn status(&self) -> CacheStatus {
        let m = &self.metrics;
        CacheStatus {
            engine: self.engine.name().to_string(),
            entries: self.entries.len(),
            max_templates: self.config.max_templates,
            single_flight: self.config.single_flight,
            hits: m.hits.load(Ordering::Relaxed),
            misses: m.misses.load(Ordering::Relaxed),
            stale: m.stale.load(Ordering::Relaxed),
            coalesced: m.coalesced.load(Ordering::Relaxed),
            compilations: m.compilations.load(Ordering::Relaxed),
            compile_failures: m.compile_failures.load(Ordering::Relaxed),
            evictions: m.evictions.load(Ordering::Relaxed),
            hit_rate: m.hit_rate(),
        }
    }

    /// Get a valid compiled template for `file`, compiling if needed.
    ///
    /// The file is expected to exist and be readable; failures to stat,
    /// read or compile it are reported as [`Error::Compile`] and leave no
    /// entry behind.
    pub fn fetch(&self, file: &dyn TemplateFile) -> Result<SharedTemplate> {
        let key = file.key();
        let span = tracing::debug_span!("template_fetch", key = %key);
        let _enter = span.enter();

        let current = self.current_identity(&key, file)?;
        match self.lookup(&key, &current) {
            Lookup::Hit(template) => {
                self.metrics.record_hit();
                trace!("Valid cache hit");
                return Ok(template);
            }
            Lookup::Stale(cached) => {
                self.metrics.record_stale();
                trace!(?cached, ?current, "Cached template needs recompilation");
            }
            Lookup::Missing => {}
        }
        self.metrics.record_miss();

        if !self.config.single_flight {
            return self.compile_and_store(&key, file);
        }

        self.flights.with_lock(&key, || {
            // Another caller may have compiled while we waited.
            let current = self.current_identity(&key, file)?;
            if let Lookup::Hit(template) = self.lookup(&key, &current) {
                self.metrics.record_coalesced();
                trace!("Compiled by a concurrent request");
                return Ok(template);
            }
            self.compile_and_store(&key, file)
        })
    }

    fn current_identity(&self, key: &str, file: &dyn TemplateFile) -> Result<FileIdentity> {
        file.identity().map_err(|e| {
            self.metrics.record_compile_failure();
            Error::compile(
                key,
                format!("cannot stat template source: {e}"),
                Some(Box::new(e)),
            )
        })
    }

    fn lookup(&self, key: &str, current: &FileIdentity) -> Lookup {
        let Some(entry) = self.entries.get(key) else {
            return Lookup::Missing;
        };
        if entry.is_valid(current) {
            entry.touch(self.tick());
            Lookup::Hit(entry.template())
        } else {
            Lookup::Stale(entry.snapshot())
        }
    }

    fn compile_and_store(&self, key: &str, file: &dyn TemplateFile) -> Result<SharedTemplate> {
        debug!("Creating new template from file {}", file.path().display());

        // Snapshot before reading: a write racing the read changes the
        // identity, so the entry can only be stale, never wrongly valid.
        let before = self.current_identity(key, file)?;
        let compiled = file
            .read_all()
            .map_err(|e| {
                Error::compile(
                    key,
                    format!("cannot read template source: {e}"),
                    Some(Box::new(e)),
                )
            })
            .and_then(|source| {
                let start = Instant::now();
                self.engine
                    .compile(&source)
                    .map(|template| (template, start.elapsed()))
                    .map_err(|e| Error::compile(key, e.to_string(), Some(Box::new(e))))
            });

        let (template, compile_time) = match compiled {
            Ok(compiled) => compiled,
            Err(err) => {
                self.metrics.record_compile_failure();
                self.entries.remove_if(key, |_, entry| !entry.is_valid(&before));
                self.sync_entry_count();
                return Err(err);
            }
        };
        self.metrics.record_compilation();

        let current = match file.identity() {
            Ok(current) if current == before => current,
            _ => {
                warn!("Template source changed while compiling; not caching this version");
                return Ok(template);
            }
        };

        let entry = Arc::new(CacheEntry::new(
            key,
            before,
            Arc::clone(&template),
            compile_time,
        ));
        entry.touch(self.tick());
        self.store(entry, &current);
        debug!(?compile_time, "Created and added template to cache");
        Ok(template)
    }

    fn store(&self, entry: Arc<CacheEntry>, current: &FileIdentity) {
        if self.config.max_templates > 0
            && !self.entries.contains_key(entry.key())
            && self.entries.len() >= self.config.max_templates
        {
            self.evict_lru();
        }

        match self.entries.entry(entry.key().to_string()) {
            Entry::Occupied(mut occupied) => {
                // Racing compiles without single-flight: one that already
                // matches the live file stays, anything else is replaced.
                if self.config.single_flight || !occupied.get().is_valid(current) {
                    occupied.insert(entry);
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }
        self.sync_entry_count();
    }

    /// Evict least recently used template
    fn evict_lru(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().last_used.load(Ordering::Relaxed))
            .map(|e| e.key().clone());

        if let Some(key) = oldest {
            if self.entries.remove(&key).is_some() {
                trace!(evicted = %key, "Evicted least recently used template");
                self.metrics.record_eviction();
            }
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn sync_entry_count(&self) {
        self.metrics
            .entries
            .store(self.entries.len(), Ordering::Relaxed);
    }
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("engine", &self.engine.name())
            .field("entries", &self.entries.len())
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
