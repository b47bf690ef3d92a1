//! Node configuration.

use crate::Args;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address the p2p listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Addresses to contact at startup.
    #[serde(default)]
    pub seed_peers: Vec<String>,
    /// Use the legacy network magic.
    #[serde(default)]
    pub legacy_magic: bool,
    /// Seconds between header sync rounds.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
    /// Maximum number of transactions held in the pool.
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], mw_network::DEFAULT_PORT))
}

fn default_sync_interval() -> u64 {
    30
}

fn default_max_pool_size() -> usize {
    50_000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            seed_peers: Vec::new(),
            legacy_magic: false,
            sync_interval_secs: default_sync_interval(),
            max_pool_size: default_max_pool_size(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from file, then apply CLI overrides.
    pub fn load(config_path: &Path, args: &Args) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).context("failed to read config file")?;
            toml::from_str(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        if let Some(listen) = args.listen {
            config.listen_addr = listen;
        }
        for peer in &args.peer {
            config.seed_peers.push(peer.clone());
        }

        Ok(config)
    }
}
