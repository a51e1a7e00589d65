//! Error types for Templet.
//!
//! Errors fall into four families that the request pipeline treats
//! differently: resolution failures end a request with a status response,
//! compile and render failures become internal errors, and initialization
//! failures stop the server before it accepts any request.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Templet operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Templet.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Resolution Errors
    // ========================================================================
    /// Requested template file does not exist.
    #[error("Template not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Requested template file exists but cannot be read.
    #[error("Template not readable: {}", .0.display())]
    Forbidden(PathBuf),

    // ========================================================================
    // Template Errors
    // ========================================================================
    /// Template source could not be read or compiled.
    #[error("Creation of template '{template}' failed: {message}")]
    Compile {
        /// Cache key (canonical path) of the template
        template: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Compiled template failed while being evaluated.
    #[error("Rendering of template '{template}' failed: {message}")]
    Render {
        /// Cache key (canonical path) of the template
        template: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ========================================================================
    // Startup Errors
    // ========================================================================
    /// The configured template engine cannot be constructed.
    #[error("Template engine initialization failed: {0}")]
    Initialization(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    // ========================================================================
    // IO and Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // ========================================================================
    // Other Errors
    // ========================================================================
    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// File absent or unreadable
    Resolution,
    /// Source unreadable or rejected by the engine
    Compile,
    /// Evaluation against bindings failed
    Render,
    /// Engine could not be constructed at startup
    Initialization,
    /// Anything else
    Other,
}

impl Error {
    /// Creates a new compile error.
    pub fn compile(
        template: impl Into<String>,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Compile {
            template: template.into(),
            message: message.into(),
            source,
        }
    }

    /// Creates a new render error.
    pub fn render(
        template: impl Into<String>,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Render {
            template: template.into(),
            message: message.into(),
            source,
        }
    }

    /// Creates a new initialization error.
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization(message.into())
    }

    /// Creates a new invalid config error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns the family this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) | Error::Forbidden(_) => ErrorKind::Resolution,
            Error::Compile { .. } => ErrorKind::Compile,
            Error::Render { .. } => ErrorKind::Render,
            Error::Initialization(_) => ErrorKind::Initialization,
            _ => ErrorKind::Other,
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Resolution => 2,
            ErrorKind::Compile => 3,
            ErrorKind::Render => 4,
            ErrorKind::Initialization => 5,
            ErrorKind::Other => 1,
        }
    }
}
