//! Logging setup.
//!
//! Templet logs through the `tracing` macros everywhere; this module only
//! decides where those events go and in which format.
//!
//! ```rust,ignore
//! use templet::telemetry::{LoggingBuilder, LogFormat, LogLevel};
//!
//! LoggingBuilder::new()
//!     .with_level(LogLevel::Debug)
//!     .with_format(LogFormat::Compact)
//!     .init()?;
//!
//! tracing::info!(root = %root.display(), "Serving templates");
//! ```

pub mod config;
pub mod logging;

pub use config::{LogFormat, LogLevel, LoggingConfig};
pub use logging::{config_for_verbosity, LoggingBuilder};
