//! Tera-backed engine.

use std::error::Error as _;
use std::io;
use std::sync::Arc;

use ::tera::{Context, Tera};

use super::{EngineError, SharedTemplate, Template, TemplateEngine};
use crate::binding::Variables;

const TEMPLATE_NAME: &str = "template";

/// Engine compiling Tera syntax. Autoescaping is off; templates decide.
#[derive(Debug, Default, Clone, Copy)]
pub struct TeraEngine;

impl TeraEngine {
    /// Create a new engine
    pub fn new() -> Self {
        Self
    }
}

impl TemplateEngine for TeraEngine {
    fn name(&self) -> &'static str {
        "tera"
    }

    fn compile(&self, source: &str) -> Result<SharedTemplate, EngineError> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_template(TEMPLATE_NAME, source)
            .map_err(|e| convert(&e))?;
        Ok(Arc::new(TeraTemplate { tera }))
    }
}

/// A template compiled by [`TeraEngine`].
#[derive(Debug)]
pub struct TeraTemplate {
    tera: Tera,
}

impl Template for TeraTemplate {
    fn render(&self, vars: &Variables, out: &mut dyn io::Write) -> Result<(), EngineError> {
        let context = Context::from_serialize(vars).map_err(|e| convert(&e))?;
        self.tera
            .render_to(TEMPLATE_NAME, &context, out)
            .map_err(|e| convert(&e))
    }
}

// Tera puts the useful detail in the source chain.
fn convert(err: &::tera::Error) -> EngineError {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    EngineError::new(message)
}
