//! Request service pipeline.
//!
//! [`TemplateService::handle`] drives one request through
//!
//! ```text
//! Resolving -> NotFound | Forbidden
//! Resolving -> Fetching -> CompileError
//! Resolving -> Fetching -> Fetched -> Rendering -> RenderError | Rendered
//! ```
//!
//! and returns the terminal [`Outcome`]. The service owns the only shared
//! state, the [`TemplateCache`], and is meant to be wrapped in an `Arc` and
//! called from many threads at once.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::{debug, error, info, trace};

use crate::binding::{ApplicationContext, BindingHook, Bindings, NoopHook};
use crate::cache::{TemplateCache, TemplateCacheConfig};
use crate::config::Config;
use crate::engine::{EngineRegistry, SharedTemplate};
use crate::error::{Error, ErrorKind, Result};
use crate::source::{RootResolver, TemplateFile, TemplateResolver, DEFAULT_INDEX};

/// Default content type of rendered responses.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

// ============================================================================
// Request
// ============================================================================

/// Transport-independent view of an incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRequest {
    /// HTTP method
    pub method: String,
    /// Request path, starting with `/`
    pub path: String,
    /// Query parameters
    pub query: IndexMap<String, String>,
    /// Request headers, names lowercased
    pub headers: IndexMap<String, String>,
    /// Session identifier supplied by the client, if any
    pub session_id: Option<String>,
    /// Path of an included template; overrides `path` when set
    pub include_path: Option<String>,
}

impl TemplateRequest {
    /// Create a request
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: IndexMap::new(),
            headers: IndexMap::new(),
            session_id: None,
            include_path: None,
        }
    }

    /// Create a `GET` request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    /// Add a query parameter
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Attach a session id
    pub fn with_session(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Render `path` in place of the request path
    pub fn with_include_path(mut self, path: impl Into<String>) -> Self {
        self.include_path = Some(path.into());
        self
    }

    /// The path a resolver should look up
    pub fn template_path(&self) -> &str {
        self.include_path.as_deref().unwrap_or(&self.path)
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// States a request passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestPhase {
    Resolving,
    Fetching,
    Fetched,
    Rendering,
    Rendered,
    NotFound,
    Forbidden,
    CompileError,
    RenderError,
}

impl RequestPhase {
    /// Whether the request stops in this phase
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rendered | Self::NotFound | Self::Forbidden | Self::CompileError | Self::RenderError
        )
    }
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::Fetching => "fetching",
            Self::Fetched => "fetched",
            Self::Rendering => "rendering",
            Self::Rendered => "rendered",
            Self::NotFound => "not-found",
            Self::Forbidden => "forbidden",
            Self::CompileError => "compile-error",
            Self::RenderError => "render-error",
        };
        f.write_str(name)
    }
}

/// Time spent in the two expensive steps of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timings {
    /// Cache fetch, including any compile
    pub fetch: Duration,
    /// Template evaluation
    pub render: Duration,
}

impl Timings {
    /// Diagnostic trailer appended to rendered bodies
    pub fn trailer(&self) -> String {
        format!(
            "\n<!-- Generated by templet [create/get={} ms, make={} ms] -->\n",
            self.fetch.as_millis(),
            self.render.as_millis()
        )
    }
}

/// Result of handling one request.
#[derive(Debug)]
pub enum Outcome {
    /// No template at the requested path
    NotFound { path: PathBuf },
    /// Template exists but may not be read
    Forbidden { path: PathBuf },
    /// Compiling or rendering failed
    InternalError { error: Error },
    /// Rendered successfully
    Success {
        body: String,
        content_type: String,
        timings: Timings,
    },
}

impl Outcome {
    /// HTTP status code for this outcome
    pub fn status_code(&self) -> u16 {
        match self {
            Outcome::NotFound { .. } => 404,
            Outcome::Forbidden { .. } => 403,
            Outcome::InternalError { .. } => 500,
            Outcome::Success { .. } => 200,
        }
    }

    /// Terminal phase the request ended in
    pub fn phase(&self) -> RequestPhase {
        match self {
            Outcome::NotFound { .. } => RequestPhase::NotFound,
            Outcome::Forbidden { .. } => RequestPhase::Forbidden,
            Outcome::InternalError { error } if error.kind() == ErrorKind::Render => {
                RequestPhase::RenderError
            }
            Outcome::InternalError { .. } => RequestPhase::CompileError,
            Outcome::Success { .. } => RequestPhase::Rendered,
        }
    }

    /// Whether the request rendered successfully
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// Rendered body, if any
    pub fn body(&self) -> Option<&str> {
        match self {
            Outcome::Success { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Convert into a `Result`, mapping non-success outcomes to errors
    pub fn into_result(self) -> Result<String> {
        match self {
            Outcome::Success { body, .. } => Ok(body),
            Outcome::NotFound { path } => Err(Error::NotFound(path)),
            Outcome::Forbidden { path } => Err(Error::Forbidden(path)),
            Outcome::InternalError { error } => Err(error),
        }
    }
}

// ============================================================================
// Service
// ============================================================================

/// The request pipeline: resolve, fetch, bind, render.
pub struct TemplateService {
    cache: Arc<TemplateCache>,
    resolver: Box<dyn TemplateResolver>,
    hook: Box<dyn BindingHook>,
    context: ApplicationContext,
    append_diagnostic_trailer: bool,
}

impl TemplateService {
    /// Start building a service serving templates below `root`
    pub fn builder(root: impl Into<PathBuf>) -> TemplateServiceBuilder {
        TemplateServiceBuilder::new(root)
    }

    /// Build a service from loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        TemplateServiceBuilder::from_config(config).build()
    }

    /// The shared template cache
    pub fn cache(&self) -> &Arc<TemplateCache> {
        &self.cache
    }

    /// Server-wide values exposed to templates
    pub fn context(&self) -> &ApplicationContext {
        &self.context
    }

    /// Template root directory
    pub fn root(&self) -> &Path {
        &self.context.root
    }

    /// Whether successful bodies get the timing trailer
    pub fn appends_diagnostic_trailer(&self) -> bool {
        self.append_diagnostic_trailer
    }

    /// Handle one request
    pub fn handle(&self, request: &TemplateRequest) -> Outcome {
        let span = tracing::debug_span!("handle", method = %request.method, path = %request.path);
        let _enter = span.enter();

        trace!(phase = %RequestPhase::Resolving);
        let file = self.resolver.resolve(request);
        if !file.exists() {
            debug!(file = %file.path().display(), "Template not found");
            return Outcome::NotFound {
                path: file.path().to_path_buf(),
            };
        }
        if !file.readable() {
            debug!(file = %file.path().display(), "Template not readable");
            return Outcome::Forbidden {
                path: file.path().to_path_buf(),
            };
        }

        trace!(phase = %RequestPhase::Fetching);
        let started = Instant::now();
        let template = match self.cache.fetch(file.as_ref()) {
            Ok(template) => template,
            Err(error) => {
                error!(file = %file.path().display(), %error, "Template compilation failed");
                return Outcome::InternalError { error };
            }
        };
        let fetch = started.elapsed();
        trace!(phase = %RequestPhase::Fetched);

        let mut bindings = Bindings::for_request(request, &self.context);
        self.hook.set_variables(&mut bindings, request);

        trace!(phase = %RequestPhase::Rendering);
        let started = Instant::now();
        let rendered = self.render(&template, bindings, file.as_ref());
        let timings = Timings {
            fetch,
            render: started.elapsed(),
        };

        match rendered {
            Ok(mut body) => {
                // Output handed to a hook sink gets no trailer.
                if let (true, Some(body)) = (self.append_diagnostic_trailer, body.as_mut()) {
                    body.push_str(&timings.trailer());
                }
                trace!(phase = %RequestPhase::Rendered, ?timings);
                Outcome::Success {
                    body: body.unwrap_or_default(),
                    content_type: self.context.content_type.clone(),
                    timings,
                }
            }
            Err(error) => {
                error!(file = %file.path().display(), %error, "Template rendering failed");
                Outcome::InternalError { error }
            }
        }
    }

    /// Render into a private buffer, then hand it to the hook's sink
    /// (returning `None`) or back as the body.
    ///
    /// Nothing reaches the sink unless the render completed.
    fn render(
        &self,
        template: &SharedTemplate,
        bindings: Bindings,
        file: &dyn TemplateFile,
    ) -> Result<Option<String>> {
        let name = file.path().display().to_string();
        let render_error = |e: &dyn fmt::Display| Error::render(&name, e.to_string(), None);
        let (variables, sink) = bindings.into_parts();

        let mut buffer = Vec::new();
        template
            .render(&variables, &mut buffer)
            .map_err(|e| Error::render(&name, e.to_string(), Some(Box::new(e))))?;

        match sink {
            Some(mut sink) => {
                sink.write_all(&buffer).map_err(|e| render_error(&e))?;
                sink.flush().map_err(|e| render_error(&e))?;
                Ok(None)
            }
            None => String::from_utf8(buffer)
                .map(Some)
                .map_err(|e| render_error(&e)),
        }
    }
}

impl fmt::Debug for TemplateService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateService")
            .field("cache", &self.cache)
            .field("context", &self.context)
            .field("append_diagnostic_trailer", &self.append_diagnostic_trailer)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`TemplateService`].
pub struct TemplateServiceBuilder {
    root: PathBuf,
    engine: Option<String>,
    registry: EngineRegistry,
    resolver: Option<Box<dyn TemplateResolver>>,
    hook: Box<dyn BindingHook>,
    cache_config: TemplateCacheConfig,
    index: String,
    content_type: String,
    append_diagnostic_trailer: bool,
}

impl TemplateServiceBuilder {
    fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            engine: None,
            registry: EngineRegistry::builtin(),
            resolver: None,
            hook: Box::new(NoopHook),
            cache_config: TemplateCacheConfig::default(),
            index: DEFAULT_INDEX.to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            append_diagnostic_trailer: true,
        }
    }

    /// Builder pre-populated from loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.templates.root)
            .engine(&config.templates.engine)
            .index(&config.templates.index)
            .content_type(&config.templates.content_type)
            .diagnostic_trailer(config.templates.append_diagnostic_trailer)
            .cache_config(TemplateCacheConfig {
                max_templates: config.cache.max_templates,
                single_flight: config.cache.single_flight,
            })
    }

    /// Select the template engine by registry name
    pub fn engine(mut self, name: impl Into<String>) -> Self {
        self.engine = Some(name.into());
        self
    }

    /// Use a custom engine registry
    pub fn registry(mut self, registry: EngineRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the default root-directory resolver
    pub fn resolver(mut self, resolver: impl TemplateResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Install the binding hook
    pub fn hook(mut self, hook: impl BindingHook + 'static) -> Self {
        self.hook = Box::new(hook);
        self
    }

    /// Configure the template cache
    pub fn cache_config(mut self, config: TemplateCacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Index file for directory requests
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    /// Content type of successful responses
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Append the timing trailer to rendered bodies
    pub fn diagnostic_trailer(mut self, enabled: bool) -> Self {
        self.append_diagnostic_trailer = enabled;
        self
    }

    /// Build the service, failing if the engine cannot be constructed
    pub fn build(self) -> Result<TemplateService> {
        let engine = self.registry.create(self.engine.as_deref())?;
        let engine_name = engine.name();
        let cache = Arc::new(TemplateCache::new(engine, self.cache_config));
        let resolver = match self.resolver {
            Some(resolver) => resolver,
            None => Box::new(RootResolver::new(&self.root).with_index(self.index)),
        };

        info!(
            engine = engine_name,
            root = %self.root.display(),
            trailer = self.append_diagnostic_trailer,
            "Template service initialized"
        );

        Ok(TemplateService {
            cache,
            resolver,
            hook: self.hook,
            context: ApplicationContext::new(self.root, self.content_type),
            append_diagnostic_trailer: self.append_diagnostic_trailer,
        })
    }
}
