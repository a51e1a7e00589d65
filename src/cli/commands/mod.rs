//! Subcommands module for Templet CLI

pub mod check;
pub mod render;
#[cfg(feature = "server")]
pub mod serve;

use crate::cli::output::OutputFormatter;
use templet::config::Config;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli, config: Config) -> Self {
        Self {
            config,
            output: OutputFormatter::new(!cli.no_color, cli.verbosity()),
        }
    }
}
