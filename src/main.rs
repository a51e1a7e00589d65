//! Templet - a template server with a compiled template cache
//!
//! This is the main entry point for the Templet CLI.

mod cli;

use anyhow::Result;
use cli::commands::CommandContext;
use cli::{Cli, Commands};
use templet::config::Config;
use templet::telemetry::{config_for_verbosity, LoggingBuilder, LoggingConfig};

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config = Config::load(cli.config.as_ref())?;

    // Initialize logging
    init_logging(&cli, &config)?;

    if cli.verbosity() >= 2 {
        eprintln!("Templet v{}", VERSION);
    }

    let mut ctx = CommandContext::new(&cli, config);

    let exit_code = match &cli.command {
        #[cfg(feature = "server")]
        Commands::Serve(args) => args.execute(&mut ctx).await?,
        Commands::Render(args) => args.execute(&mut ctx)?,
        Commands::Check(args) => args.execute(&mut ctx)?,
    };

    std::process::exit(exit_code);
}

/// Initialize logging from verbosity flags or the loaded configuration
fn init_logging(cli: &Cli, config: &Config) -> Result<()> {
    // An untouched logging section means CLI defaults (warnings only).
    let mut logging = if cli.verbose > 0 || config.logging == LoggingConfig::default() {
        config_for_verbosity(cli.verbosity())
    } else {
        config.logging.clone()
    };
    if cli.no_color {
        logging.ansi_colors = false;
    }

    LoggingBuilder::from_config(logging).init()?;
    Ok(())
}
