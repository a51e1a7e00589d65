//! Shared test utilities and fixtures for the Templet test suite.
//!
//! This module provides:
//! - A counting engine that records every compile
//! - In-memory template files with controllable identity
//! - A resolver serving those in-memory files
//! - Temporary template trees on disk with pinned modification times
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use parking_lot::RwLock;
use tempfile::TempDir;

use templet::cache::{TemplateCache, TemplateCacheConfig};
use templet::engine::{EngineError, SharedTemplate, SimpleTemplateEngine, TemplateEngine};
use templet::service::TemplateRequest;
use templet::source::{FileIdentity, TemplateFile, TemplateResolver};

// ============================================================================
// Counting Engine
// ============================================================================

/// Simple engine wrapper that counts compile calls and can be slowed down.
#[derive(Debug, Clone, Default)]
pub struct CountingEngine {
    inner: SimpleTemplateEngine,
    compiles: Arc<AtomicUsize>,
    delay: Duration,
}

impl CountingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every compile
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of compile calls so far, successful or not
    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

impl TemplateEngine for CountingEngine {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn compile(&self, source: &str) -> Result<SharedTemplate, EngineError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.inner.compile(source)
    }
}

/// Cache backed by a counting engine; the returned engine shares its counter.
pub fn counting_cache(config: TemplateCacheConfig) -> (TemplateCache, CountingEngine) {
    let engine = CountingEngine::new();
    let cache = TemplateCache::new(Arc::new(engine.clone()), config);
    (cache, engine)
}

// ============================================================================
// In-memory Template Files
// ============================================================================

#[derive(Debug)]
struct MemoryState {
    content: String,
    modified: SystemTime,
    exists: bool,
    readable: bool,
    // Applied right after the next read completes.
    rewrite_after_read: Option<String>,
}

/// A template file living in memory. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    key: String,
    path: PathBuf,
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryFile {
    /// Create an existing, readable file
    pub fn new(key: &str, content: &str) -> Self {
        Self {
            key: key.to_string(),
            path: PathBuf::from(key),
            state: Arc::new(RwLock::new(MemoryState {
                content: content.to_string(),
                modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000),
                exists: true,
                readable: true,
                rewrite_after_read: None,
            })),
        }
    }

    /// A handle for a file that does not exist
    pub fn missing(key: &str) -> Self {
        let file = Self::new(key, "");
        file.state.write().exists = false;
        file
    }

    /// Replace the content and advance the modification time by one second
    pub fn rewrite(&self, content: &str) {
        let mut state = self.state.write();
        state.content = content.to_string();
        state.modified += Duration::from_secs(1);
    }

    /// Replace the content without touching the modification time
    pub fn rewrite_in_place(&self, content: &str) {
        self.state.write().content = content.to_string();
    }

    /// Replace the content and set the modification time, earlier or later
    pub fn rewrite_at(&self, content: &str, secs: u64) {
        let mut state = self.state.write();
        state.content = content.to_string();
        state.modified = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);
    }

    /// Advance the modification time only
    pub fn touch(&self) {
        self.state.write().modified += Duration::from_secs(1);
    }

    pub fn set_readable(&self, readable: bool) {
        self.state.write().readable = readable;
    }

    /// Simulate a writer racing the next read
    pub fn rewrite_after_next_read(&self, content: &str) {
        self.state.write().rewrite_after_read = Some(content.to_string());
    }
}

impl TemplateFile for MemoryFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn key(&self) -> String {
        self.key.clone()
    }

    fn exists(&self) -> bool {
        self.state.read().exists
    }

    fn readable(&self) -> bool {
        let state = self.state.read();
        state.exists && state.readable
    }

    fn identity(&self) -> io::Result<FileIdentity> {
        let state = self.state.read();
        if !state.exists {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such template"));
        }
        Ok(FileIdentity::new(state.modified, state.content.len() as u64))
    }

    fn read_all(&self) -> io::Result<String> {
        let mut state = self.state.write();
        if !state.readable {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "not readable"));
        }
        let content = state.content.clone();
        if let Some(next) = state.rewrite_after_read.take() {
            state.content = next;
            state.modified += Duration::from_secs(1);
        }
        Ok(content)
    }
}

/// Resolver over a fixed set of in-memory files, keyed by request path.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    files: Arc<RwLock<HashMap<String, MemoryFile>>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file under a request path and return a handle to it
    pub fn add(&self, path: &str, content: &str) -> MemoryFile {
        let file = MemoryFile::new(&format!("mem:{path}"), content);
        self.files.write().insert(path.to_string(), file.clone());
        file
    }
}

impl TemplateResolver for MemoryResolver {
    fn resolve(&self, request: &TemplateRequest) -> Box<dyn TemplateFile> {
        let path = request.template_path();
        match self.files.read().get(path) {
            Some(file) => Box::new(file.clone()),
            None => Box::new(MemoryFile::missing(&format!("mem:{path}"))),
        }
    }
}

// ============================================================================
// Template Trees on Disk
// ============================================================================

/// A temporary template root.
pub struct TemplateTree {
    dir: TempDir,
    // Every write gets a strictly later mtime, independent of clock resolution.
    clock: AtomicUsize,
}

impl TemplateTree {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
            clock: AtomicUsize::new(1_000),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a template and give it a fresh modification time
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create template dir");
        }
        fs::write(&path, content).expect("write template");
        let secs = self.clock.fetch_add(1, Ordering::SeqCst) as i64;
        filetime::set_file_mtime(&path, FileTime::from_unix_time(secs, 0)).expect("set mtime");
        path
    }

    /// Write a template with an explicit modification time
    pub fn write_at(&self, name: &str, content: &str, secs: i64) -> PathBuf {
        let path = self.write(name, content);
        filetime::set_file_mtime(&path, FileTime::from_unix_time(secs, 0)).expect("set mtime");
        path
    }
}

impl Default for TemplateTree {
    fn default() -> Self {
        Self::new()
    }
}
