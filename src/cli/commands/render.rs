//! Render command
//!
//! Runs one template through the same pipeline the server uses and prints
//! the result to stdout.

use super::CommandContext;
use crate::cli::TemplateArgs;
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::Write;
use templet::binding::StaticVariables;
use templet::service::{TemplateRequest, TemplateServiceBuilder};

/// Arguments for the render command
#[derive(Parser, Debug, Clone)]
pub struct RenderArgs {
    /// Template path relative to the root
    pub path: String,

    #[command(flatten)]
    pub templates: TemplateArgs,

    /// Template variable (key=value, JSON values keep their type)
    #[arg(short = 'D', long = "define", value_name = "KEY=VALUE", action = clap::ArgAction::Append)]
    pub vars: Vec<String>,

    /// Append the timing trailer
    #[arg(long)]
    pub trailer: bool,
}

impl RenderArgs {
    /// Execute the render command
    pub fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        self.templates.apply(&mut ctx.config);
        let variables = StaticVariables::from_pairs(&self.vars).map_err(|e| anyhow!(e))?;

        let service = TemplateServiceBuilder::from_config(&ctx.config)
            .diagnostic_trailer(self.trailer)
            .hook(variables)
            .build()?;

        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        match service.handle(&TemplateRequest::get(path)).into_result() {
            Ok(body) => {
                let mut stdout = std::io::stdout().lock();
                stdout
                    .write_all(body.as_bytes())
                    .and_then(|_| stdout.flush())
                    .context("Failed to write rendered output")?;
                Ok(0)
            }
            Err(e) => {
                ctx.output.error(&e.to_string());
                Ok(e.exit_code())
            }
        }
    }
}
