//! Output formatting for CLI commands

use crate::sync::RenderedSecret;
use anyhow::{Context, Result};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

/// Format a rendered secret as a Secret manifest
pub fn format_rendered(secret: &RenderedSecret, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => secret.to_json().context("Failed to serialize to JSON"),
        OutputFormat::Yaml => secret.to_yaml().context("Failed to serialize to YAML"),
    }
}

/// Print a rendered secret to stdout
pub fn print_rendered(secret: &RenderedSecret, format: OutputFormat) -> Result<()> {
    let text = format_rendered(secret, format)?;
    println!("{}", text.trim_end());
    Ok(())
}
