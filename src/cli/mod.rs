//! CLI module for Templet
//!
//! Argument parsing and subcommand dispatch for the `templet` binary.

pub mod commands;
pub mod output;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use templet::config::Config;

/// Templet - a template server with a compiled template cache
#[derive(Parser, Debug, Clone)]
#[command(name = "templet")]
#[command(author = "Templet Contributors")]
#[command(version)]
#[command(about = "Serve and render templates with a staleness-validated compile cache", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "TEMPLET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve templates over HTTP
    #[cfg(feature = "server")]
    Serve(commands::serve::ServeArgs),

    /// Render one template to stdout
    Render(commands::render::RenderArgs),

    /// Compile every template under the root and report failures
    Check(commands::check::CheckArgs),
}

/// Options shared by all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct TemplateArgs {
    /// Template root directory
    #[arg(short = 'r', long)]
    pub root: Option<PathBuf>,

    /// Template engine (simple, jinja, tera)
    #[arg(short = 'e', long)]
    pub engine: Option<String>,
}

impl TemplateArgs {
    /// Override configuration values given on the command line
    pub fn apply(&self, config: &mut Config) {
        if let Some(root) = &self.root {
            config.templates.root = root.clone();
        }
        if let Some(engine) = &self.engine {
            config.templates.engine = engine.clone();
        }
    }
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }
}
