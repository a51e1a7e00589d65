//! Output formatting module for Templet
//!
//! Colored status lines on stderr; stdout is reserved for rendered output.

use colored::Colorize;
use std::path::Path;

use templet::cache::PreloadReport;

/// Output formatter for command feedback
#[derive(Debug, Clone)]
pub struct OutputFormatter {
    /// Verbosity level
    verbosity: u8,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, verbosity: u8) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();
        colored::control::set_override(use_color);
        Self { verbosity }
    }

    /// Print an informational line
    pub fn info(&self, message: &str) {
        eprintln!("{}", message);
    }

    /// Print a detail line, only with `-v`
    pub fn detail(&self, message: &str) {
        if self.verbosity > 0 {
            eprintln!("  {}", message.dimmed());
        }
    }

    /// Print a success line
    pub fn success(&self, message: &str) {
        eprintln!("{}", message.green());
    }

    /// Print a warning line
    pub fn warning(&self, message: &str) {
        eprintln!("{} {}", "WARNING:".yellow().bold(), message);
    }

    /// Print an error line
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "ERROR:".red().bold(), message);
    }

    /// Print the result of compiling a template tree
    pub fn preload_report(&self, root: &Path, report: &PreloadReport) {
        for (path, message) in &report.failed {
            let shown = path.strip_prefix(root).unwrap_or(path);
            eprintln!("{} {}", "failed:".red().bold(), shown.display());
            eprintln!("  {}", message);
        }

        let summary = format!(
            "{} template(s) checked: {} ok, {} failed",
            report.total(),
            report.compiled,
            report.failed.len()
        );
        if report.is_clean() {
            self.success(&summary);
        } else {
            self.error(&summary);
        }
    }
}
