//! Serve command

use super::CommandContext;
use crate::cli::TemplateArgs;
use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use templet::cache::TemplatePreloader;
use templet::server::{shutdown_signal, ServerConfig, TemplateServer};
use templet::service::TemplateService;

/// Arguments for the serve command
#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub templates: TemplateArgs,

    /// Address to listen on
    #[arg(short = 'b', long)]
    pub bind: Option<String>,

    /// Compile all templates before accepting requests
    #[arg(long)]
    pub preload: bool,

    /// Do not append the timing trailer to rendered pages
    #[arg(long)]
    pub no_trailer: bool,

    /// Allow cross-origin requests
    #[arg(long)]
    pub cors: bool,
}

impl ServeArgs {
    /// Execute the serve command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        self.templates.apply(&mut ctx.config);
        if let Some(bind) = &self.bind {
            ctx.config.server.bind_address = bind.clone();
        }
        if self.preload {
            ctx.config.cache.preload = true;
        }
        if self.no_trailer {
            ctx.config.templates.append_diagnostic_trailer = false;
        }
        if self.cors {
            ctx.config.server.enable_cors = true;
        }
        ctx.config.validate()?;

        let service = Arc::new(TemplateService::from_config(&ctx.config)?);
        let root = ctx.config.templates.root.clone();
        if !root.is_dir() {
            ctx.output
                .warning(&format!("Template root {} does not exist yet", root.display()));
        }

        if ctx.config.cache.preload {
            let preloader =
                TemplatePreloader::with_patterns(&root, &ctx.config.cache.preload_patterns)?;
            let report = preloader.preload(service.cache());
            ctx.output.preload_report(&root, &report);
        }

        let config = ServerConfig::default()
            .with_address(ctx.config.bind_address()?)
            .with_cors(ctx.config.server.enable_cors);
        ctx.output.info(&format!(
            "Serving {} on http://{}",
            root.display(),
            config.bind_address
        ));

        TemplateServer::new(config, service)
            .run_with_shutdown(shutdown_signal())
            .await?;
        Ok(0)
    }
}
