//! # mw-network
//!
//! P2P networking layer: wire framing, typed messages, the connection
//! handshake, per-peer reader/writer tasks and the peers pool.
//!
//! The layer is protocol-only: decoded messages are dispatched through the
//! [`MessageHandler`] seam and chain state is read through
//! [`ChainSummary`], so the consensus side stays testable with in-memory
//! fakes.

mod error;
mod frame;
mod handshake;
mod message;
mod peer;
mod pool;

pub use error::{NetworkError, NetworkResult};
pub use frame::{read_any_message, read_message, write_message, MsgHeader};
pub use handshake::{Hand, NonceRing, Shake, HANDSHAKE_NONCES};
pub use message::{read_addr, read_string, write_addr, write_string, Message, PeerError, Ping};
pub use peer::{HandshakeInfo, MessageHandler, Peer};
pub use pool::{
    PeerEntry, PeerInfo, PeerStatus, PeersPool, MAX_ONLINE_CONNECTIONS, MAX_PEERS_TABLE_SIZE,
};

use mw_consensus::{Capabilities, Difficulty, MAGIC_CODE};
use std::net::SocketAddr;
use std::time::Duration;

/// Default p2p port.
pub const DEFAULT_PORT: u16 = 13414;

/// Name and version of this software, advertised in handshakes.
pub const USER_AGENT: &str = concat!("mw-node ", env!("CARGO_PKG_VERSION"));

/// Chain state the networking layer needs for handshakes and pings.
pub trait ChainSummary: Send + Sync {
    /// Total difficulty accumulated by our chain.
    fn total_difficulty(&self) -> Difficulty;

    /// Our chain height.
    fn height(&self) -> u64;
}

/// Network configuration.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Magic code expected in every frame header.
    pub magic: [u8; 2],
    /// Capabilities we advertise.
    pub capabilities: Capabilities,
    /// User agent we advertise.
    pub user_agent: String,
    /// Address we advertise as the handshake sender.
    pub listen_addr: SocketAddr,
    /// Bound of each peer's outbound queue.
    pub send_queue_size: usize,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Timeout for the handshake exchange.
    pub handshake_timeout: Duration,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            magic: MAGIC_CODE,
            capabilities: Capabilities::FULL_NODE,
            user_agent: USER_AGENT.to_string(),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            send_queue_size: 50,
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(30),
        }
    }
}
