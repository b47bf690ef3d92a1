//! Node wiring: chain, mempool, peers pool and synchronizer.

use crate::config::NodeConfig;
use anyhow::Result;
use mw_chain::{Chain, MemoryStore};
use mw_consensus::{LEGACY_MAGIC_CODE, MAGIC_CODE};
use mw_mempool::{PoolConfig, TransactionPool};
use mw_network::{MessageHandler, NetConfig, PeersPool};
use mw_sync::{ChainStatus, Syncer};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// A running node.
pub struct Node {
    config: NodeConfig,
    pool: Arc<PeersPool>,
    syncer: Arc<Syncer<Chain, TransactionPool>>,
}

impl Node {
    /// Assemble a node from its configuration.
    pub fn new(config: NodeConfig) -> Result<Self> {
        let chain = Chain::new(mw_chain::genesis::mainnet(), Box::new(MemoryStore::new()));
        let chain = Arc::new(RwLock::new(chain));

        let mempool = Arc::new(Mutex::new(TransactionPool::new(PoolConfig {
            max_pool_size: config.max_pool_size,
        })));

        let net_config = NetConfig {
            magic: if config.legacy_magic {
                LEGACY_MAGIC_CODE
            } else {
                MAGIC_CODE
            },
            listen_addr: config.listen_addr,
            ..NetConfig::default()
        };

        let pool = PeersPool::new(net_config, Arc::new(ChainStatus(chain.clone())));
        let syncer = Syncer::new(chain, mempool, pool.clone());

        for addr in &config.seed_peers {
            pool.add(addr);
        }

        Ok(Self {
            config,
            pool,
            syncer,
        })
    }

    /// Run the listener, the scheduling loop and the sync ticker until
    /// shutdown.
    pub async fn run(&self) -> Result<()> {
        let handler: Arc<dyn MessageHandler> = self.syncer.clone();

        let listener = TcpListener::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "p2p listener up");

        let accept_pool = self.pool.clone();
        let accept_handler = handler.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if let Err(e) = accept_pool
                            .accept(stream, addr, accept_handler.clone())
                            .await
                        {
                            warn!(addr = %addr, error = %e, "inbound connection rejected");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        });

        let sync_syncer = self.syncer.clone();
        let sync_interval = Duration::from_secs(self.config.sync_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sync_interval);
            loop {
                ticker.tick().await;
                sync_syncer.request_headers().await;
            }
        });

        self.pool.clone().run(handler).await;
        Ok(())
    }

    /// Stop the scheduling loop and close every connection.
    pub fn shutdown(&self) {
        info!("shutting down");
        self.pool.stop();
    }
}
