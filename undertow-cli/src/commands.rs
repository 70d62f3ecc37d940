//! CLI command implementations

use anyhow::Context;
use clap::Subcommand;
use serde::Serialize;
use undertow_core::UndertowConfig;
use undertow_sources::{CatalogId, MediaKind, SourcePipeline};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the JSON API server
    Serve {
        /// Host to bind to (defaults to UNDERTOW_HOST or 127.0.0.1)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to (defaults to PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the servers offered for a movie or episode
    Servers {
        /// movie or tv
        kind: MediaKind,
        /// Catalog id
        id: String,
    },
    /// Resolve stream sources from every server, or from one
    Resolve {
        /// movie or tv
        kind: MediaKind,
        /// Catalog id
        id: String,
        /// Resolve only this server
        #[arg(short, long)]
        server: Option<String>,
    },
    /// Decode an embed URL directly, skipping server discovery
    Embed {
        /// movie or tv
        kind: MediaKind,
        /// Catalog id the embed belongs to
        id: String,
        /// Embed page URL
        url: String,
        /// Server family the URL belongs to
        #[arg(short, long, default_value = "UpCloud")]
        server: String,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the underlying configuration, network or decoding failure
pub async fn handle_command(command: Commands, mut config: UndertowConfig) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.web.host = host;
            }
            if let Some(port) = port {
                config.web.port = port;
            }
            undertow_web::run_server(config).await?;
            Ok(())
        }
        Commands::Servers { kind, id } => {
            let pipeline = pipeline(&config)?;
            let servers = pipeline.list_servers(&CatalogId::new(kind, &id)?).await?;
            print_json(&servers)
        }
        Commands::Resolve { kind, id, server } => {
            let pipeline = pipeline(&config)?;
            let id = CatalogId::new(kind, &id)?;
            match server {
                Some(server) => print_json(&pipeline.resolve_one(&id, &server).await?),
                None => print_json(&pipeline.resolve_all(&id).await?),
            }
        }
        Commands::Embed {
            kind,
            id,
            url,
            server,
        } => {
            let pipeline = pipeline(&config)?;
            let id = CatalogId::new(kind, &id)?;
            print_json(&pipeline.resolve_embed(&id, &url, &server).await?)
        }
    }
}

fn pipeline(config: &UndertowConfig) -> anyhow::Result<SourcePipeline> {
    config.validate()?;
    SourcePipeline::from_config(config).context("failed to set up resolution pipeline")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
