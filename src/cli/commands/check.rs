//! Check command
//!
//! Compiles every template under the root through a fresh cache and reports
//! the ones that fail.

use super::CommandContext;
use crate::cli::TemplateArgs;
use anyhow::{bail, Result};
use clap::Parser;
use templet::cache::TemplatePreloader;
use templet::service::TemplateService;

/// Arguments for the check command
#[derive(Parser, Debug, Clone)]
pub struct CheckArgs {
    #[command(flatten)]
    pub templates: TemplateArgs,

    /// Glob pattern selecting templates (repeatable; defaults to the configured preload patterns)
    #[arg(short = 'p', long = "pattern", action = clap::ArgAction::Append)]
    pub patterns: Vec<String>,
}

impl CheckArgs {
    /// Execute the check command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        self.templates.apply(&mut ctx.config);
        let root = ctx.config.templates.root.clone();
        if !root.is_dir() {
            bail!("Template root not found: {}", root.display());
        }

        let service = TemplateService::from_config(&ctx.config)?;
        let patterns = if self.patterns.is_empty() {
            &ctx.config.cache.preload_patterns
        } else {
            &self.patterns
        };
        let preloader = TemplatePreloader::with_patterns(&root, patterns)?;

        ctx.output.info(&format!(
            "Checking templates in {} with the {} engine",
            root.display(),
            service.cache().engine().name()
        ));
        for path in preloader.files() {
            ctx.output.detail(&path.display().to_string());
        }

        let report = preloader.preload(service.cache());
        ctx.output.preload_report(&root, &report);

        Ok(if report.is_clean() { 0 } else { 1 })
    }
}
