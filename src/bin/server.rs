//! natcheck-server - rendezvous service for natcheck
//!
//! Publishes two peers over `GET /peerinfo` and dials subjects back on
//! request.

use anyhow::Context;
use clap::Parser;
use natcheck::config::ServerConfig;
use natcheck::identity::ServiceIdentity;
use natcheck::service::RendezvousService;
use std::path::PathBuf;

/// Rendezvous and connect-back service
#[derive(Parser)]
#[command(name = "natcheck-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serve the HTTP interface on this port
    #[arg(short, long)]
    listen: Option<u16>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the peer keys
    #[arg(long)]
    key_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    natcheck::init(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };

    if let Some(port) = cli.listen {
        config.http_port = port;
    }
    if let Some(dir) = cli.key_dir {
        config.key_dir = dir.to_string_lossy().into_owned();
    }

    let identity = ServiceIdentity::load(&config.key_dir)
        .with_context(|| format!("Failed to load keys from {}", config.key_dir))?;

    let service = RendezvousService::start(config, identity).await?;
    tracing::info!("Serving /peerinfo on {}", service.http_addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for shutdown signal")?;
    tracing::info!("Shutting down");

    Ok(())
}
