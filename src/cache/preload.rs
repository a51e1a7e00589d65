//! Cache warm-up from a template directory.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::TemplateCache;
use crate::error::{Error, Result};
use crate::source::FsTemplateFile;

/// Patterns used when none are configured.
pub const DEFAULT_PRELOAD_PATTERNS: &[&str] = &["**/*.tmpl", "**/*.html"];

/// Outcome of a preload run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreloadReport {
    /// Templates compiled into the cache
    pub compiled: usize,
    /// Templates that failed to compile, with the error text
    pub failed: Vec<(PathBuf, String)>,
}

impl PreloadReport {
    /// Number of templates looked at
    pub fn total(&self) -> usize {
        self.compiled + self.failed.len()
    }

    /// Whether every template compiled
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Preloader for batch template compilation
///
/// Walks a template root and compiles every file matching one of the
/// patterns, so the first requests after startup hit a warm cache.
#[derive(Debug)]
pub struct TemplatePreloader {
    root: PathBuf,
    patterns: GlobSet,
}

impl TemplatePreloader {
    /// Create a preloader with the default patterns
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_patterns(root, DEFAULT_PRELOAD_PATTERNS)
    }

    /// Create a preloader matching `patterns` relative to `root`
    pub fn with_patterns<I, S>(root: impl Into<PathBuf>, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern).map_err(|e| {
                Error::invalid_config(
                    "cache.preload_patterns",
                    format!("invalid glob pattern '{pattern}': {e}"),
                )
            })?;
            builder.add(glob);
        }
        let patterns = builder.build().map_err(|e| {
            Error::invalid_config(
                "cache.preload_patterns",
                format!("failed to build glob set: {e}"),
            )
        })?;

        Ok(Self {
            root: root.into(),
            patterns,
        })
    }

    /// The directory being scanned
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files under the root matching the patterns, sorted by path
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .strip_prefix(&self.root)
                    .map(|rel| self.patterns.is_match(rel))
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    }

    /// Compile all matching templates into the cache
    pub fn preload(&self, cache: &TemplateCache) -> PreloadReport {
        let mut report = PreloadReport::default();

        for path in self.files() {
            let file = FsTemplateFile::new(&path);
            match cache.fetch(&file) {
                Ok(_) => {
                    debug!(path = %path.display(), "Preloaded template");
                    report.compiled += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to preload template");
                    report.failed.push((path, e.to_string()));
                }
            }
        }

        info!(
            root = %self.root.display(),
            compiled = report.compiled,
            failed = report.failed.len(),
            "Template preload finished"
        );
        report
    }
}
