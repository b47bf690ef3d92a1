//! The synchronizer: one dispatcher for every decoded peer message.

use crate::{Blockchain, ChainError, Mempool};
use async_trait::async_trait;
use mw_consensus::Difficulty;
use mw_network::{Message, MessageHandler, NetworkResult, Peer, PeersPool, Ping};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Synchronizes the blockchain and mempool through the peers pool.
pub struct Syncer<C: Blockchain, M: Mempool> {
    chain: Arc<RwLock<C>>,
    mempool: Arc<Mutex<M>>,
    pool: Arc<PeersPool>,
}

impl<C, M> Syncer<C, M>
where
    C: Blockchain + 'static,
    M: Mempool + 'static,
{
    /// Create a synchronizer over the given facades.
    pub fn new(chain: Arc<RwLock<C>>, mempool: Arc<Mutex<M>>, pool: Arc<PeersPool>) -> Arc<Self> {
        Arc::new(Self {
            chain,
            mempool,
            pool,
        })
    }

    /// The peers pool this synchronizer drives.
    pub fn pool(&self) -> &Arc<PeersPool> {
        &self.pool
    }

    /// Ask every connected peer that claims more work than us for the
    /// headers following our tip.
    pub async fn request_headers(&self) {
        let (our_difficulty, locator) = {
            let chain = self.chain.read();
            (chain.total_difficulty(), chain.locator())
        };

        for (addr, entry) in self.pool.connected_entries() {
            let (ahead, peer) = {
                let peer_info = entry.lock();
                (peer_info.total_difficulty > our_difficulty, peer_info.peer.clone())
            };
            let Some(peer) = peer else { continue };

            if ahead {
                debug!(peer = %addr, "requesting headers");
                peer.send_header_request(locator.clone()).await;
            }
        }
    }

    fn update_peer_state(&self, addr: &str, total_difficulty: Difficulty, height: u64) {
        if let Some(entry) = self.pool.peer_info(addr) {
            let mut peer_info = entry.lock();
            peer_info.total_difficulty = total_difficulty;
            peer_info.height = height;
        }
    }

    /// Dispatch one message from `peer`.
    pub async fn process_message(&self, peer: Arc<Peer>, message: Message) {
        let addr = peer.addr().to_string();

        match message {
            Message::Ping(ping) => {
                self.update_peer_state(&addr, ping.total_difficulty, ping.height);

                // Both values under one read lock so the pair is coherent.
                let (total_difficulty, height) = {
                    let chain = self.chain.read();
                    (chain.total_difficulty(), chain.height())
                };
                peer.send(Message::Pong(Ping {
                    total_difficulty,
                    height,
                }))
                .await;
            }

            Message::Pong(pong) => {
                self.update_peer_state(&addr, pong.total_difficulty, pong.height);
            }

            Message::GetPeerAddrs(capabilities) => {
                let addrs = self.pool.peers(capabilities);
                debug!(peer = %addr, count = addrs.len(), "answering peer request");
                peer.send(Message::PeerAddrs(addrs)).await;
            }

            Message::PeerAddrs(addrs) => {
                info!(peer = %addr, count = addrs.len(), "received peer addresses");
                for peer_addr in addrs {
                    self.pool.add(&peer_addr.to_string());
                }
            }

            Message::GetHeaders(locator) => {
                let headers = self.chain.read().block_headers(&locator);
                peer.send(Message::Headers(headers)).await;
            }

            Message::Headers(headers) => {
                if let Err(e) = self.chain.write().process_headers(&headers) {
                    warn!(peer = %addr, error = %e, "bad header batch, banning peer");
                    self.pool.ban(&addr);
                }
            }

            Message::Header(header) => {
                // A failing single header is logged but not banned for.
                let height = header.height;
                if let Err(e) = self.chain.write().process_headers(std::slice::from_ref(&header))
                {
                    info!(peer = %addr, height, error = %e, "failed to process header");
                }
            }

            Message::GetBlock(hash) => {
                // No reply when the block is unknown.
                let block = self.chain.read().block(&hash);
                if let Some(block) = block {
                    peer.send(Message::Block(block)).await;
                }
            }

            Message::Block(block) => {
                match self.chain.write().process_block(&block) {
                    Ok(()) => {}
                    Err(ChainError::State(e)) => {
                        debug!(peer = %addr, height = block.header.height, reason = %e, "block not applied");
                    }
                    Err(ChainError::Consensus(e)) => {
                        warn!(peer = %addr, error = %e, "bad block, banning peer");
                        self.pool.ban(&addr);
                        return;
                    }
                }

                // The sender has at least this block's chain.
                if let Some(entry) = self.pool.peer_info(&addr) {
                    let mut peer_info = entry.lock();
                    if peer_info.total_difficulty < block.header.total_difficulty
                        || peer_info.height < block.header.height
                    {
                        peer_info.total_difficulty = block.header.total_difficulty;
                        peer_info.height = block.header.height;
                    }
                }

                // A block at our tip is news worth spreading.
                if block.header.height == self.chain.read().height() {
                    self.pool.propagate_block(&block);
                }
            }

            Message::Transaction(tx) | Message::StemTransaction(tx) => {
                match self.mempool.lock().process_tx(tx) {
                    Ok(()) => {}
                    Err(ChainError::State(e)) => {
                        debug!(peer = %addr, reason = %e, "transaction not admitted");
                    }
                    Err(ChainError::Consensus(e)) => {
                        warn!(peer = %addr, error = %e, "bad transaction, banning peer");
                        self.pool.ban(&addr);
                    }
                }
            }

            Message::Error(e) => {
                warn!(peer = %addr, code = e.code, message = %e.message, "peer reported error");
            }

            other => {
                debug!(peer = %addr, msg = ?other.msg_type(), "ignoring message");
            }
        }
    }
}

#[async_trait]
impl<C, M> MessageHandler for Syncer<C, M>
where
    C: Blockchain + 'static,
    M: Mempool + 'static,
{
    async fn handle(&self, peer: Arc<Peer>, msg: Message) -> NetworkResult<()> {
        self.process_message(peer, msg).await;
        Ok(())
    }
}
