//! Engine registry.
//!
//! Engines are looked up by name once, when the service is built. An
//! unknown name is an [`Error::Initialization`], so a misconfigured server
//! never starts instead of failing every request.

use std::collections::HashMap;
use std::sync::Arc;

use super::{JinjaEngine, SimpleTemplateEngine, TemplateEngine, TeraEngine};
use crate::error::{Error, Result};

/// Engine factory function type.
pub type EngineFactory = fn() -> Arc<dyn TemplateEngine>;

/// Engine used when none is configured.
pub const DEFAULT_ENGINE: &str = "simple";

/// Name to factory table for template engines.
///
/// # Example
///
/// ```rust
/// use templet::engine::EngineRegistry;
///
/// let registry = EngineRegistry::builtin();
/// let engine = registry.create(Some("jinja")).unwrap();
/// assert_eq!(engine.name(), "jinja");
/// assert!(registry.create(Some("velocity")).is_err());
/// ```
#[derive(Clone)]
pub struct EngineRegistry {
    factories: HashMap<String, EngineFactory>,
}

impl EngineRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with the engines that ship with Templet
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("simple", || Arc::new(SimpleTemplateEngine::new()));
        registry.register("jinja", || Arc::new(JinjaEngine::new()));
        registry.register("minijinja", || Arc::new(JinjaEngine::new()));
        registry.register("tera", || Arc::new(TeraEngine::new()));
        registry
    }

    /// Register (or replace) an engine factory
    pub fn register(&mut self, name: &str, factory: EngineFactory) -> &mut Self {
        self.factories.insert(name.to_ascii_lowercase(), factory);
        self
    }

    /// Check whether an engine name is known
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered engine names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Construct the named engine, or the default one for `None`
    pub fn create(&self, name: Option<&str>) -> Result<Arc<dyn TemplateEngine>> {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_ENGINE)
            .to_ascii_lowercase();

        self.factories
            .get(&name)
            .map(|factory| factory())
            .ok_or_else(|| {
                Error::initialization(format!(
                    "unknown template engine '{}' (available: {})",
                    name,
                    self.names().join(", ")
                ))
            })
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_default_engine_is_simple() {
        let registry = EngineRegistry::builtin();
        assert_eq!(registry.create(None).unwrap().name(), "simple");
        assert_eq!(registry.create(Some("  ")).unwrap().name(), "simple");
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = EngineRegistry::builtin();
        assert_eq!(registry.create(Some("Tera")).unwrap().name(), "tera");
        assert_eq!(registry.create(Some("MiniJinja")).unwrap().name(), "jinja");
        assert!(registry.contains("SIMPLE"));
    }

    #[test]
    fn test_unknown_engine_is_initialization_error() {
        let err = EngineRegistry::builtin()
            .create(Some("velocity"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Initialization);
        assert!(err.to_string().contains("available: jinja, minijinja, simple, tera"));
    }

    #[test]
    fn test_register_custom_engine() {
        let mut registry = EngineRegistry::empty();
        assert!(registry.create(None).is_err());
        registry.register("plain", || Arc::new(SimpleTemplateEngine::new()));
        assert_eq!(registry.names(), vec!["plain"]);
        assert!(registry.create(Some("plain")).is_ok());
    }
}
