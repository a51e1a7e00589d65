//! Jinja2-compatible engine powered by minijinja.

use std::io;
use std::sync::Arc;

use minijinja::{Environment, UndefinedBehavior};

use super::{EngineError, SharedTemplate, Template, TemplateEngine};
use crate::binding::Variables;

const TEMPLATE_NAME: &str = "template";

/// Engine compiling Jinja2 syntax.
///
/// Undefined variables are errors, matching the `simple` engine; use
/// `{% if x is defined %}` for optional values.
#[derive(Debug, Clone)]
pub struct JinjaEngine {
    base: Environment<'static>,
}

impl JinjaEngine {
    /// Create an engine with the default environment
    pub fn new() -> Self {
        let mut base = Environment::new();
        base.set_undefined_behavior(UndefinedBehavior::Strict);
        base.set_keep_trailing_newline(true);
        Self { base }
    }

    /// Create an engine from a preconfigured environment (custom filters, tests)
    pub fn with_environment(base: Environment<'static>) -> Self {
        Self { base }
    }
}

impl Default for JinjaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for JinjaEngine {
    fn name(&self) -> &'static str {
        "jinja"
    }

    fn compile(&self, source: &str) -> Result<SharedTemplate, EngineError> {
        let mut env = self.base.clone();
        env.add_template_owned(TEMPLATE_NAME, source.to_string())
            .map_err(convert)?;
        Ok(Arc::new(JinjaTemplate { env }))
    }
}

/// A template compiled by [`JinjaEngine`].
#[derive(Debug)]
pub struct JinjaTemplate {
    env: Environment<'static>,
}

impl Template for JinjaTemplate {
    fn render(&self, vars: &Variables, out: &mut dyn io::Write) -> Result<(), EngineError> {
        let template = self.env.get_template(TEMPLATE_NAME).map_err(convert)?;
        template
            .render_to_write(vars, out)
            .map(|_| ())
            .map_err(convert)
    }
}

fn convert(err: minijinja::Error) -> EngineError {
    let message = match err.detail() {
        Some(detail) => format!("{}: {}", err.kind(), detail),
        None => err.kind().to_string(),
    };
    EngineError {
        message,
        line: err.line(),
    }
}
