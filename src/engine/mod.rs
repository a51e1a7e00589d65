//! Template engine abstraction.
//!
//! An engine turns template source text into a [`Template`], and a template
//! renders itself against a set of [`Variables`]. Everything above this
//! module (the cache, the request pipeline) only ever sees these two traits,
//! so engines can be swapped by configuration.
//!
//! Three engines ship with Templet:
//!
//! - [`SimpleTemplateEngine`] (`simple`, the default): `${expr}` substitution
//! - [`JinjaEngine`] (`jinja`): Jinja2 syntax via minijinja
//! - [`TeraEngine`] (`tera`): Tera syntax

use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::binding::Variables;

pub mod jinja;
pub mod registry;
pub mod simple;
pub mod tera;

pub use jinja::JinjaEngine;
pub use registry::{EngineFactory, EngineRegistry, DEFAULT_ENGINE};
pub use simple::SimpleTemplateEngine;
pub use self::tera::TeraEngine;

/// Error raised by an engine while compiling or rendering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}{}", line.map(|l| format!(" (line {l})")).unwrap_or_default())]
pub struct EngineError {
    /// Human-readable description
    pub message: String,
    /// 1-based source line, when the engine knows it
    pub line: Option<usize>,
}

impl EngineError {
    /// Create an error without position information
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    /// Create an error pointing at a source line
    pub fn at_line(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line: Some(line),
        }
    }
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        EngineError::new(format!("output error: {err}"))
    }
}

/// A compiled, renderable template.
///
/// Implementations must be immutable after construction: the same instance
/// is rendered concurrently by many requests.
pub trait Template: Send + Sync + fmt::Debug {
    /// Render against `vars`, streaming output into `out`.
    fn render(&self, vars: &Variables, out: &mut dyn io::Write) -> Result<(), EngineError>;

    /// Render into a string.
    fn render_to_string(&self, vars: &Variables) -> Result<String, EngineError> {
        let mut buf = Vec::new();
        self.render(vars, &mut buf)?;
        String::from_utf8(buf).map_err(|e| EngineError::new(format!("non UTF-8 output: {e}")))
    }
}

/// Shared handle to a compiled template.
pub type SharedTemplate = Arc<dyn Template>;

/// Compiles template source text.
pub trait TemplateEngine: Send + Sync {
    /// Registry name of this engine.
    fn name(&self) -> &'static str;

    /// Compile the full source text of a template.
    fn compile(&self, source: &str) -> Result<SharedTemplate, EngineError>;
}

impl fmt::Debug for dyn TemplateEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("name", &self.name())
            .finish()
    }
}
