//! Undertow CLI - Command-line interface
//!
//! Runs the API server or resolves sources directly from the terminal.

mod commands;

use std::path::Path;

use clap::Parser;
use undertow_core::UndertowConfig;
use undertow_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "undertow")]
#[command(about = "Resolve embed pages into playable stream sources")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level (RUST_LOG overrides)
    #[arg(long, global = true, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_tracing_level(), Some(Path::new("logs")))?;

    let config = UndertowConfig::from_env();
    tracing::debug!(upstream = %config.upstream.base_url, "Loaded configuration");
    commands::handle_command(cli.command, config).await?;

    Ok(())
}
