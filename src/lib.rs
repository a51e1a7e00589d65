//! # Templet - A Template Server with a Compiled Template Cache
//!
//! Templet renders dynamic text and HTML by compiling template files and
//! evaluating them against a per-request set of variables. Compiling is
//! expensive, so compiled templates are cached and reused for as long as
//! their source file is provably unchanged (same modification time and
//! length).
//!
//! ## Core Concepts
//!
//! - **Engines**: compile source text into templates (`simple`, `jinja`, `tera`)
//! - **Template cache**: one compiled template per file, re-validated on every fetch
//! - **Service pipeline**: resolve, fetch, bind, render, one request at a time
//! - **Binding hook**: extension point that adds variables before rendering
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │               CLI (clap)            HTTP server (axum)               │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     TemplateService pipeline                         │
//! │        resolve → fetch → bindings + hook → render → outcome          │
//! └─────────────────────────────────────────────────────────────────────┘
//!          │                         │                         │
//!          ▼                         ▼                         ▼
//! ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────────┐
//! │  RootResolver   │   │    TemplateCache    │   │   Engine registry   │
//! │  (files under   │   │ (staleness check +  │   │  (simple, jinja,    │
//! │   the root)     │   │    single-flight)   │   │      tera)          │
//! └─────────────────┘   └─────────────────────┘   └─────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use templet::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let service = TemplateService::builder("templates")
//!         .engine("simple")
//!         .hook(|bindings: &mut Bindings, _request: &TemplateRequest| {
//!             bindings.set_variable("name", "World");
//!         })
//!         .build()?;
//!
//!     match service.handle(&TemplateRequest::get("/greet.tmpl")) {
//!         Outcome::Success { body, .. } => println!("{body}"),
//!         other => eprintln!("request ended with status {}", other.status_code()),
//!     }
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.
    //!
    //! ```rust,ignore
    //! use templet::prelude::*;
    //! ```

    pub use crate::binding::{BindingHook, Bindings, NoopHook, StaticVariables, Variables};
    pub use crate::cache::{TemplateCache, TemplateCacheConfig, TemplatePreloader};
    pub use crate::config::Config;
    pub use crate::engine::{EngineRegistry, SharedTemplate, Template, TemplateEngine};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::service::{Outcome, TemplateRequest, TemplateService};
    pub use crate::source::{FileIdentity, FsTemplateFile, RootResolver, TemplateFile};
}

pub mod binding;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
#[cfg(feature = "server")]
pub mod server;
pub mod service;
pub mod source;
pub mod telemetry;

pub use error::{Error, Result};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns detailed version information including build metadata.
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION"),
        rust_version: option_env!("CARGO_PKG_RUST_VERSION").unwrap_or("unknown"),
        target: std::env::consts::ARCH,
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Detailed version information for the Templet build.
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Semantic version string
    pub version: &'static str,
    /// Minimum Rust version required
    pub rust_version: &'static str,
    /// Target architecture of the build
    pub target: &'static str,
    /// Build profile (debug or release)
    pub profile: &'static str,
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "templet {} ({}, {}, rust {})",
            self.version, self.target, self.profile, self.rust_version
        )
    }
}
