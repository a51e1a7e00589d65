//! Template source files.
//!
//! The cache never touches the filesystem directly; it works through the
//! [`TemplateFile`] trait so tests can supply handles with controllable
//! metadata. [`FsTemplateFile`] is the real implementation and
//! [`RootResolver`] maps request paths onto files below a template root.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

use crate::service::TemplateRequest;

/// Snapshot of a file's modification time and length.
///
/// Two snapshots are equal only if both fields match exactly. This is the
/// whole staleness test: content is never hashed, so a rewrite that keeps
/// the length and lands within the same timestamp tick goes unnoticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FileIdentity {
    /// Last modification time
    pub modified: SystemTime,
    /// Length in bytes
    pub len: u64,
}

impl FileIdentity {
    /// Create a snapshot from raw values
    pub fn new(modified: SystemTime, len: u64) -> Self {
        Self { modified, len }
    }

    /// Snapshot from filesystem metadata; a missing mtime reads as the epoch
    pub fn from_metadata(metadata: &fs::Metadata) -> Self {
        Self {
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            len: metadata.len(),
        }
    }
}

/// Handle to a template source file.
pub trait TemplateFile: Send + Sync {
    /// Path as resolved from the request
    fn path(&self) -> &Path;

    /// Cache key: canonical absolute path
    fn key(&self) -> String;

    /// Whether the file exists
    fn exists(&self) -> bool;

    /// Whether the file can be opened for reading
    fn readable(&self) -> bool;

    /// Current modification time and length
    fn identity(&self) -> io::Result<FileIdentity>;

    /// Full file contents
    fn read_all(&self) -> io::Result<String>;
}

/// [`TemplateFile`] backed by the local filesystem.
#[derive(Debug, Clone)]
pub struct FsTemplateFile {
    path: PathBuf,
    // Set for paths that escape the template root.
    denied: bool,
}

impl FsTemplateFile {
    /// Create a handle for `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            denied: false,
        }
    }

    /// Handle that reports itself unreadable regardless of permissions
    pub fn denied(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            denied: true,
        }
    }
}

impl TemplateFile for FsTemplateFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn key(&self) -> String {
        fs::canonicalize(&self.path)
            .or_else(|_| std::path::absolute(&self.path))
            .unwrap_or_else(|_| self.path.clone())
            .to_string_lossy()
            .into_owned()
    }

    fn exists(&self) -> bool {
        if self.denied {
            return true;
        }
        self.path.is_file()
    }

    fn readable(&self) -> bool {
        !self.denied && File::open(&self.path).is_ok()
    }

    fn identity(&self) -> io::Result<FileIdentity> {
        fs::metadata(&self.path).map(|m| FileIdentity::from_metadata(&m))
    }

    fn read_all(&self) -> io::Result<String> {
        fs::read_to_string(&self.path)
    }
}

/// Maps a request onto a template file handle.
pub trait TemplateResolver: Send + Sync {
    /// Resolve the file a request refers to.
    fn resolve(&self, request: &TemplateRequest) -> Box<dyn TemplateFile>;
}

/// Resolves request paths below a template root directory.
///
/// `/` and paths ending in `/` map to the index file. Paths that try to
/// leave the root (`..`) resolve to a handle that exists but is not
/// readable, so they end as *forbidden*.
#[derive(Debug, Clone)]
pub struct RootResolver {
    root: PathBuf,
    index: String,
}

/// Index file used for directory requests.
pub const DEFAULT_INDEX: &str = "index.html.tmpl";

impl RootResolver {
    /// Create a resolver rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: DEFAULT_INDEX.to_string(),
        }
    }

    /// Set the index file name
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    /// The template root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a URI path onto a filesystem path; `None` if it escapes the root
    pub fn map_path(&self, uri_path: &str) -> Option<PathBuf> {
        let mut relative = PathBuf::new();
        for component in Path::new(uri_path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => relative.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        if uri_path.is_empty() || uri_path.ends_with('/') {
            relative.push(&self.index);
        }
        Some(self.root.join(relative))
    }
}

impl TemplateResolver for RootResolver {
    fn resolve(&self, request: &TemplateRequest) -> Box<dyn TemplateFile> {
        let uri_path = request.template_path();
        match self.map_path(uri_path) {
            Some(path) => Box::new(FsTemplateFile::new(path)),
            None => Box::new(FsTemplateFile::denied(self.root.join(uri_path.trim_start_matches('/')))),
        }
    }
}
