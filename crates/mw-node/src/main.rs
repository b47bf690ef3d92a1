//! Mimblewimble node entry point.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod node;

use config::NodeConfig;
use node::Node;

/// A Mimblewimble full-node core.
#[derive(Parser, Debug)]
#[command(name = "mw-node")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mw-node.toml")]
    config: PathBuf,

    /// P2P listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Seed peer to contact at startup (repeatable)
    #[arg(short, long)]
    peer: Vec<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("starting mw-node v{}", env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::load(&args.config, &args)?;
    info!(listen = %config.listen_addr, seeds = config.seed_peers.len(), "configuration loaded");

    let node = Node::new(config)?;

    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "node error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            node.shutdown();
        }
    }

    info!("mw-node stopped");
    Ok(())
}
