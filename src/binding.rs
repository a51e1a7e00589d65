//! Variables exposed to templates.
//!
//! Every request gets a fresh [`Bindings`] populated with the conventional
//! variables (`request`, `response`, `context`, `application`, `session`,
//! `params`, `now`). A [`BindingHook`] can add more before rendering and may
//! install its own output sink.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::service::TemplateRequest;

/// Variable name to value mapping handed to engines.
pub type Variables = IndexMap<String, Value>;

/// Destination for rendered output.
pub type OutputSink = Box<dyn io::Write + Send>;

/// Server-wide values exposed as `context` and `application`.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationContext {
    /// Server name
    pub name: String,
    /// Server version
    pub version: String,
    /// Template root directory
    pub root: PathBuf,
    /// Content type of successful responses
    pub content_type: String,
}

impl ApplicationContext {
    /// Create a context for a template root
    pub fn new(root: impl Into<PathBuf>, content_type: impl Into<String>) -> Self {
        Self {
            name: "templet".to_string(),
            version: crate::version().to_string(),
            root: root.into(),
            content_type: content_type.into(),
        }
    }
}

/// The binding set for one render.
#[derive(Default)]
pub struct Bindings {
    variables: Variables,
    out: Option<OutputSink>,
}

impl Bindings {
    /// Create empty bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create bindings with the conventional per-request variables
    pub fn for_request(request: &TemplateRequest, context: &ApplicationContext) -> Self {
        let mut bindings = Self::new();
        let application = serde_json::to_value(context).unwrap_or(Value::Null);

        bindings.set_variable(
            "request",
            json!({
                "method": request.method,
                "path": request.path,
                "query": request.query,
                "headers": request.headers,
            }),
        );
        bindings.set_variable(
            "response",
            json!({
                "content_type": context.content_type,
                "status": 200,
            }),
        );
        bindings.set_variable("context", application.clone());
        bindings.set_variable("application", application);

        let (session_id, is_new) = match &request.session_id {
            Some(id) => (id.clone(), false),
            None => (Uuid::new_v4().to_string(), true),
        };
        bindings.set_variable("session", json!({ "id": session_id, "new": is_new }));
        bindings.set_variable("params", json!(request.query));
        bindings.set_variable("now", json!(chrono::Utc::now().to_rfc3339()));
        bindings
    }

    /// Set a variable, replacing any previous value
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Get a variable
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Remove a variable
    pub fn remove_variable(&mut self, name: &str) -> Option<Value> {
        self.variables.shift_remove(name)
    }

    /// All variables
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Route rendered output to `sink` instead of the response buffer
    pub fn set_out(&mut self, sink: impl io::Write + Send + 'static) -> &mut Self {
        self.out = Some(Box::new(sink));
        self
    }

    /// Whether an output sink override is installed
    pub fn has_out(&self) -> bool {
        self.out.is_some()
    }

    /// Split into variables and the optional sink override
    pub fn into_parts(self) -> (Variables, Option<OutputSink>) {
        (self.variables, self.out)
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("variables", &self.variables)
            .field("out", &self.out.as_ref().map(|_| "<sink>"))
            .finish()
    }
}

/// Extension point invoked once per request between fetch and render.
pub trait BindingHook: Send + Sync {
    /// Populate additional variables or install an output sink.
    fn set_variables(&self, bindings: &mut Bindings, request: &TemplateRequest);
}

impl<F> BindingHook for F
where
    F: Fn(&mut Bindings, &TemplateRequest) + Send + Sync,
{
    fn set_variables(&self, bindings: &mut Bindings, request: &TemplateRequest) {
        self(bindings, request)
    }
}

/// Hook that leaves the bindings untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl BindingHook for NoopHook {
    fn set_variables(&self, _bindings: &mut Bindings, _request: &TemplateRequest) {}
}

/// Hook that adds a fixed set of variables.
#[derive(Debug, Default, Clone)]
pub struct StaticVariables {
    variables: Variables,
}

impl StaticVariables {
    /// Create the hook from a variable map
    pub fn new(variables: Variables) -> Self {
        Self { variables }
    }

    /// Parse `key=value` pairs; values that parse as JSON keep their type
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut variables = Variables::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got '{pair}'"))?;
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| Value::String(value.to_string()));
            variables.insert(key.trim().to_string(), value);
        }
        Ok(Self { variables })
    }
}

impl BindingHook for StaticVariables {
    fn set_variables(&self, bindings: &mut Bindings, _request: &TemplateRequest) {
        for (name, value) in &self.variables {
            bindings.set_variable(name.clone(), value.clone());
        }
    }
}

/// Cloneable in-memory sink, handy for hooks that capture output.
#[derive(Debug, Default, Clone)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents as UTF-8 (lossy)
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock()).into_owned()
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
