//! Configuration module for Templet
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/templet/templet.toml)
//! - User configuration (~/.templet.toml)
//! - Project configuration (./templet.toml)
//! - Environment variables
//! - Command-line arguments (applied by the CLI)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::cache::preload::DEFAULT_PRELOAD_PATTERNS;
use crate::engine::DEFAULT_ENGINE;
use crate::service::DEFAULT_CONTENT_TYPE;
use crate::source::DEFAULT_INDEX;
use crate::telemetry::{LogLevel, LoggingConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Template settings
    pub templates: TemplatesConfig,

    /// Compiled template cache settings
    pub cache: CacheSettings,

    /// HTTP server settings
    pub server: ServerSettings,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Template settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Template engine implementation
    pub engine: String,

    /// Directory templates are served from
    pub root: PathBuf,

    /// File served for directory requests
    pub index: String,

    /// Content type of rendered responses
    pub content_type: String,

    /// Append the timing comment to rendered output
    pub append_diagnostic_trailer: bool,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            engine: DEFAULT_ENGINE.to_string(),
            root: PathBuf::from("templates"),
            index: DEFAULT_INDEX.to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            append_diagnostic_trailer: true,
        }
    }
}

/// Cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum cached templates (0 = unbounded)
    pub max_templates: usize,

    /// Compile each template at most once at a time
    pub single_flight: bool,

    /// Compile all templates at startup
    pub preload: bool,

    /// Glob patterns selecting templates to preload
    pub preload_patterns: Vec<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_templates: 10_000,
            single_flight: true,
            preload: false,
            preload_patterns: DEFAULT_PRELOAD_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to listen on
    pub bind_address: String,

    /// Allow cross-origin requests
    pub enable_cors: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            enable_cors: false,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                config = config.merge_from_file(&path)?;
            } else if config_path == Some(&path) {
                bail!("Config file not found: {}", path.display());
            }
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // Explicit path takes priority
        if let Some(path) = explicit_path {
            paths.push(path.clone());
            return paths;
        }

        // Environment variable
        if let Ok(env_config) = std::env::var("TEMPLET_CONFIG") {
            paths.push(PathBuf::from(env_config));
            return paths;
        }

        paths.push(PathBuf::from("/etc/templet/templet.toml"));

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".templet.toml"));
        }

        paths.push(PathBuf::from("templet.toml"));
        paths
    }

    /// Merge configuration from a file
    fn merge_from_file(&self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let file_config: Config = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
            "toml" => toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?,
            _ => toml::from_str(&content)
                .or_else(|_| serde_yaml::from_str(&content))
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
        };

        Ok(self.merge(file_config))
    }

    /// Merge another config into this one; values the other config leaves
    /// at their defaults do not override ours.
    fn merge(&self, other: Config) -> Config {
        let defaults = Config::default();
        Config {
            templates: TemplatesConfig {
                engine: pick(&self.templates.engine, other.templates.engine, &defaults.templates.engine),
                root: pick(&self.templates.root, other.templates.root, &defaults.templates.root),
                index: pick(&self.templates.index, other.templates.index, &defaults.templates.index),
                content_type: pick(
                    &self.templates.content_type,
                    other.templates.content_type,
                    &defaults.templates.content_type,
                ),
                append_diagnostic_trailer: pick(
                    &self.templates.append_diagnostic_trailer,
                    other.templates.append_diagnostic_trailer,
                    &defaults.templates.append_diagnostic_trailer,
                ),
            },
            cache: CacheSettings {
                max_templates: pick(
                    &self.cache.max_templates,
                    other.cache.max_templates,
                    &defaults.cache.max_templates,
                ),
                single_flight: pick(
                    &self.cache.single_flight,
                    other.cache.single_flight,
                    &defaults.cache.single_flight,
                ),
                preload: pick(&self.cache.preload, other.cache.preload, &defaults.cache.preload),
                preload_patterns: pick(
                    &self.cache.preload_patterns,
                    other.cache.preload_patterns,
                    &defaults.cache.preload_patterns,
                ),
            },
            server: ServerSettings {
                bind_address: pick(
                    &self.server.bind_address,
                    other.server.bind_address,
                    &defaults.server.bind_address,
                ),
                enable_cors: pick(
                    &self.server.enable_cors,
                    other.server.enable_cors,
                    &defaults.server.enable_cors,
                ),
            },
            logging: pick(&self.logging, other.logging, &defaults.logging),
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // TEMPLET_ENGINE
        if let Ok(engine) = std::env::var("TEMPLET_ENGINE") {
            self.templates.engine = engine;
        }

        // TEMPLET_ROOT
        if let Ok(root) = std::env::var("TEMPLET_ROOT") {
            self.templates.root = PathBuf::from(root);
        }

        // TEMPLET_BIND
        if let Ok(bind) = std::env::var("TEMPLET_BIND") {
            self.server.bind_address = bind;
        }

        // TEMPLET_GENERATED_BY
        if let Ok(flag) = std::env::var("TEMPLET_GENERATED_BY") {
            if let Some(enabled) = parse_bool(&flag) {
                self.templates.append_diagnostic_trailer = enabled;
            }
        }

        // TEMPLET_LOG_LEVEL
        if let Ok(level) = std::env::var("TEMPLET_LOG_LEVEL") {
            if let Ok(level) = level.parse::<LogLevel>() {
                self.logging.level = level;
            }
        }
    }

    /// Check values that would otherwise fail later at startup
    pub fn validate(&self) -> Result<()> {
        if self.templates.engine.trim().is_empty() {
            bail!("templates.engine must not be empty");
        }
        self.bind_address()?;
        Ok(())
    }

    /// Parsed listen address
    pub fn bind_address(&self) -> Result<SocketAddr> {
        self.server
            .bind_address
            .parse()
            .with_context(|| format!("Invalid server.bind_address '{}'", self.server.bind_address))
    }

    /// Load from a specific file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Config::default().merge_from_file(path.as_ref())
    }
}

fn pick<T: Clone + PartialEq>(current: &T, other: T, default: &T) -> T {
    if other != *default {
        other
    } else {
        current.clone()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
