//! Structured logging layer using the tracing crate.
//!
//! Supports pretty, compact, JSON and full output on stderr or a log file.

use crate::telemetry::config::{LogFormat, LogLevel, LoggingConfig};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Builder for constructing a logging layer.
#[derive(Debug)]
pub struct LoggingBuilder {
    config: LoggingConfig,
}

impl LoggingBuilder {
    /// Create a new logging builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: LoggingConfig::default(),
        }
    }

    /// Create a builder from an existing configuration.
    pub fn from_config(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Set the log level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// Set the log format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Set ANSI colors.
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.config.ansi_colors = enabled;
        self
    }

    /// Include span information.
    pub fn with_spans(mut self, enabled: bool) -> Self {
        self.config.with_spans = enabled;
        self
    }

    /// Include target in logs.
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.config.with_target = enabled;
        self
    }

    /// Set filter directive.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.filter = Some(filter.into());
        self
    }

    /// Set log file path.
    pub fn with_file_output(mut self, path: impl AsRef<Path>) -> Self {
        self.config.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// The configuration being built
    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    /// Build and initialize the logging layer (global subscriber).
    pub fn init(self) -> crate::error::Result<()> {
        let layer = self.build_layer()?;
        tracing_subscriber::registry()
            .with(layer)
            .try_init()
            .map_err(|e| crate::error::Error::Config(e.to_string()))
    }

    /// Build a logging layer that can be composed with other layers.
    pub fn build_layer<S>(self) -> crate::error::Result<Box<dyn Layer<S> + Send + Sync + 'static>>
    where
        S: Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
    {
        let env_filter = self.build_filter();
        let writer = self.make_writer()?;
        let config = self.config;
        let span_events = if config.with_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let ansi = config.ansi_colors && config.file.is_none();

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_target(config.with_target)
            .with_file(config.with_file)
            .with_line_number(config.with_file)
            .with_thread_ids(config.with_thread_ids);

        let layer = match config.format {
            LogFormat::Pretty => layer
                .pretty()
                .with_ansi(ansi)
                .with_span_events(span_events)
                .with_filter(env_filter)
                .boxed(),
            LogFormat::Compact => layer
                .compact()
                .with_ansi(ansi)
                .with_span_events(span_events)
                .with_filter(env_filter)
                .boxed(),
            LogFormat::Json => layer
                .json()
                .with_current_span(config.with_spans)
                .with_span_list(config.with_spans)
                .with_span_events(span_events)
                .with_filter(env_filter)
                .boxed(),
            LogFormat::Full => layer
                .with_ansi(ansi)
                .with_span_events(FmtSpan::FULL)
                .with_filter(env_filter)
                .boxed(),
        };

        Ok(layer)
    }

    fn build_filter(&self) -> EnvFilter {
        let default_filter = self.config.level.to_string();

        if let Some(ref filter) = self.config.filter {
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(filter))
                .unwrap_or_else(|_| EnvFilter::new(&default_filter))
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter))
        }
    }

    fn make_writer(&self) -> crate::error::Result<BoxMakeWriter> {
        match &self.config.file {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Ok(BoxMakeWriter::new(Arc::new(file)))
            }
            None => Ok(BoxMakeWriter::new(std::io::stderr)),
        }
    }
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging configuration implied by a `-v` count.
pub fn config_for_verbosity(verbosity: u8) -> LoggingConfig {
    LoggingConfig {
        level: LogLevel::from_verbosity(verbosity),
        format: if verbosity >= 3 {
            LogFormat::Full
        } else {
            LogFormat::Pretty
        },
        with_file: verbosity >= 3,
        with_target: verbosity >= 2,
        ..Default::default()
    }
}
