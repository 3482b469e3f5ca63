//! natcheck - is this host reachable from the internet?
//!
//! Asks a rendezvous service to dial back, tries a NAT port mapping and
//! prints a JSON report on stdout.

use clap::Parser;
use natcheck::config::ClientConfig;
use std::path::PathBuf;

/// Check inbound reachability through NAT
#[derive(Parser)]
#[command(name = "natcheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on for the connect-back (0 = any)
    #[arg(short, long)]
    listen: Option<u16>,

    /// URL of the rendezvous service
    #[arg(long)]
    server: Option<String>,

    /// Don't attempt a NAT port mapping
    #[arg(long)]
    no_nat: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    natcheck::init(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };

    if let Some(port) = cli.listen {
        config.listen_port = port;
    }
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if cli.no_nat {
        config.disable_mapping = true;
    }

    let report = natcheck::diagnose::run(&config).await?;
    tracing::info!("{}", report.summary());
    report.print()?;

    Ok(())
}
