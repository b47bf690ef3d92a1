//! The peers pool: peer table, bans, connection budget and propagation.
//!
//! Lock order is peers_table, then connected, then banned. Each peer's
//! own info mutex nests innermost.

use crate::handshake::NonceRing;
use crate::peer::{MessageHandler, Peer};
use crate::{ChainSummary, NetConfig, NetworkError, NetworkResult};
use mw_consensus::{Block, Capabilities, Difficulty, MAX_PEER_ADDRS, ZERO_DIFFICULTY};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::net::TcpStream;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

/// Maximum number of live connections.
pub const MAX_ONLINE_CONNECTIONS: usize = 15;

/// Maximum number of addresses kept in the peer table.
pub const MAX_PEERS_TABLE_SIZE: usize = 10_000;

/// Pause between connection attempts in the scheduling loop.
const CONNECT_PACE: Duration = Duration::from_secs(1);

/// Lifecycle of a known peer address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    /// Discovered but never contacted.
    New,
    /// Handshake completed, connection live.
    Connected,
    /// Banned for a consensus or protocol violation.
    Banned,
    /// Cleanly disconnected, may be retried.
    Disconnected,
    /// Last connection attempt failed, retried as a fallback.
    FailedConn,
}

/// Everything we know about a peer address.
#[derive(Debug)]
pub struct PeerInfo {
    /// Lifecycle status.
    pub status: PeerStatus,
    /// Handle to the live connection, when connected: a cheap clone of
    /// the send queue and shutdown signal. The connection tasks own the
    /// socket.
    pub peer: Option<Arc<Peer>>,
    /// Protocol version from the handshake.
    pub protocol_version: u32,
    /// Capabilities from the handshake.
    pub capabilities: Capabilities,
    /// Best known height.
    pub height: u64,
    /// Best known total difficulty.
    pub total_difficulty: Difficulty,
    /// Software name and version.
    pub user_agent: String,
    /// When we last held a connection to this address.
    pub last_conn: SystemTime,
}

impl PeerInfo {
    fn new() -> Self {
        Self {
            status: PeerStatus::New,
            peer: None,
            protocol_version: 0,
            capabilities: Capabilities::UNKNOWN,
            height: 0,
            total_difficulty: ZERO_DIFFICULTY,
            user_agent: String::new(),
            last_conn: SystemTime::UNIX_EPOCH,
        }
    }
}

/// Shared handle to one peer's info.
pub type PeerEntry = Arc<Mutex<PeerInfo>>;

/// Controls connections with peers.
pub struct PeersPool {
    config: NetConfig,
    chain: Arc<dyn ChainSummary>,

    peers_table: Mutex<HashMap<String, PeerEntry>>,
    connected: Mutex<HashMap<String, PeerEntry>>,
    banned: Mutex<HashSet<String>>,

    slots: Arc<Semaphore>,
    nonces: Mutex<NonceRing>,
    quit_tx: watch::Sender<bool>,
}

impl PeersPool {
    /// Create a pool over the given chain state source.
    pub fn new(config: NetConfig, chain: Arc<dyn ChainSummary>) -> Arc<Self> {
        let (quit_tx, _) = watch::channel(false);

        Arc::new(Self {
            config,
            chain,
            peers_table: Mutex::new(HashMap::new()),
            connected: Mutex::new(HashMap::new()),
            banned: Mutex::new(HashSet::new()),
            slots: Arc::new(Semaphore::new(MAX_ONLINE_CONNECTIONS)),
            nonces: Mutex::new(NonceRing::default()),
            quit_tx,
        })
    }

    /// Add a peer address to the table. Malformed, multicast and
    /// port-zero addresses are dropped, as is anything beyond the table
    /// size cap. Known addresses are left untouched.
    pub fn add(&self, addr: &str) {
        let socket_addr: SocketAddr = match addr.parse() {
            Ok(a) => a,
            Err(_) => return,
        };

        if socket_addr.ip().is_multicast() || socket_addr.port() == 0 {
            return;
        }

        let mut table = self.peers_table.lock();
        if table.len() >= MAX_PEERS_TABLE_SIZE {
            return;
        }
        if table.contains_key(addr) {
            return;
        }

        table.insert(addr.to_string(), Arc::new(Mutex::new(PeerInfo::new())));
    }

    /// Live peer addresses whose capabilities contain `capabilities`,
    /// skipping banned and failed peers, up to the wire maximum.
    pub fn peers(&self, capabilities: Capabilities) -> Vec<SocketAddr> {
        let table = self.peers_table.lock();

        let mut addrs = Vec::new();
        for (addr, entry) in table.iter() {
            let info = entry.lock();
            if matches!(info.status, PeerStatus::Banned | PeerStatus::FailedConn) {
                continue;
            }
            if !info.capabilities.contains(capabilities) {
                continue;
            }
            drop(info);

            if let Ok(socket_addr) = addr.parse() {
                addrs.push(socket_addr);
            }
            if addrs.len() == MAX_PEER_ADDRS {
                break;
            }
        }

        addrs
    }

    /// Look up a peer entry.
    pub fn peer_info(&self, addr: &str) -> Option<PeerEntry> {
        self.peers_table.lock().get(addr).cloned()
    }

    /// Number of live connections.
    pub fn connected_count(&self) -> usize {
        self.connected.lock().len()
    }

    /// Whether `addr` is banned.
    pub fn is_banned(&self, addr: &str) -> bool {
        self.banned.lock().contains(addr)
    }

    /// Ban a peer: mark it, record the address in the ban set, drop it
    /// from both tables and close the connection.
    pub fn ban(&self, addr: &str) {
        let entry = self.peers_table.lock().remove(addr);
        let Some(entry) = entry else { return };

        let peer = {
            let mut info = entry.lock();
            info.status = PeerStatus::Banned;
            info.peer.take()
        };

        self.connected.lock().remove(addr);
        self.banned.lock().insert(addr.to_string());

        if let Some(peer) = peer {
            peer.close("banned");
        }

        warn!(addr, "banned peer");
    }

    /// Send `block` to every connected peer that is behind it, without
    /// blocking the caller on any queue.
    pub fn propagate_block(&self, block: &Block) {
        let entries: Vec<(String, PeerEntry)> = self
            .connected
            .lock()
            .iter()
            .map(|(a, e)| (a.clone(), e.clone()))
            .collect();

        for (addr, entry) in entries {
            let (behind, peer) = {
                let info = entry.lock();
                let behind = info.height < block.header.height
                    || info.total_difficulty < block.header.total_difficulty;
                (behind, info.peer.clone())
            };

            if !behind {
                continue;
            }
            let Some(peer) = peer else { continue };

            let block = block.clone();
            tokio::spawn(async move {
                debug!(addr = %addr, height = block.header.height, "propagating block");
                peer.send_block(block).await;
            });
        }
    }

    /// Snapshot of the connected peers.
    pub fn connected_entries(&self) -> Vec<(String, PeerEntry)> {
        self.connected
            .lock()
            .iter()
            .map(|(addr, entry)| (addr.clone(), entry.clone()))
            .collect()
    }

    /// The scheduling loop: while the budget permits, pick an address
    /// worth contacting and connect to it. Runs until [`stop`].
    ///
    /// [`stop`]: PeersPool::stop
    pub async fn run(self: Arc<Self>, handler: Arc<dyn MessageHandler>) {
        let mut quit_rx = self.quit_tx.subscribe();

        loop {
            let permit = tokio::select! {
                _ = quit_rx.changed() => break,
                permit = self.slots.clone().acquire_owned() => {
                    permit.expect("slot semaphore never closes")
                }
            };

            match self.not_connected() {
                Some(addr) => {
                    if let Err(e) = self.clone().connect_peer(&addr, permit, handler.clone()).await
                    {
                        error!(addr = %addr, error = %e, "connection failed");
                    }
                }
                None => drop(permit),
            }

            tokio::select! {
                _ = quit_rx.changed() => break,
                _ = tokio::time::sleep(CONNECT_PACE) => {}
            }
        }

        self.close_all();
    }

    /// Signal the scheduling loop to stop and close every connection.
    pub fn stop(&self) {
        let _ = self.quit_tx.send(true);
    }

    fn close_all(&self) {
        let table = self.peers_table.lock();
        for entry in table.values() {
            let mut info = entry.lock();
            if let Some(peer) = info.peer.take() {
                peer.close("pool shutting down");
            }
            if info.status == PeerStatus::Connected {
                info.status = PeerStatus::Disconnected;
            }
        }
        drop(table);

        self.connected.lock().clear();
    }

    /// Pick an address worth contacting: fresh or cleanly disconnected
    /// peers first, previously failed ones as a fallback.
    fn not_connected(&self) -> Option<String> {
        let table = self.peers_table.lock();

        for (addr, entry) in table.iter() {
            let status = entry.lock().status;
            if matches!(status, PeerStatus::New | PeerStatus::Disconnected) {
                return Some(addr.clone());
            }
        }

        for (addr, entry) in table.iter() {
            if entry.lock().status == PeerStatus::FailedConn {
                return Some(addr.clone());
            }
        }

        None
    }

    async fn connect_peer(
        self: Arc<Self>,
        addr: &str,
        permit: tokio::sync::OwnedSemaphorePermit,
        handler: Arc<dyn MessageHandler>,
    ) -> NetworkResult<()> {
        let entry = self
            .peer_info(addr)
            .ok_or_else(|| NetworkError::PeerNotFound(addr.to_string()))?;

        {
            let info = entry.lock();
            if matches!(info.status, PeerStatus::Banned | PeerStatus::Connected) {
                debug!(addr, "not connecting to banned or already connected peer");
                return Ok(());
            }
        }

        let socket_addr: SocketAddr = addr
            .parse()
            .map_err(|_| NetworkError::PeerNotFound(addr.to_string()))?;

        let nonce = self.nonces.lock().next_nonce();
        let peer = match Peer::connect(
            socket_addr,
            &self.config,
            self.chain.total_difficulty(),
            nonce,
            handler,
        )
        .await
        {
            Ok(peer) => peer,
            Err(e) => {
                entry.lock().status = PeerStatus::FailedConn;
                return Err(e);
            }
        };

        self.register(addr, &entry, peer.clone());

        // First words after the handshake.
        peer.send_ping(self.chain.total_difficulty(), self.chain.height())
            .await;
        peer.send_peer_request(Capabilities::FULL_NODE).await;

        // Return the slot and update the tables once the peer goes away.
        let pool = self.clone();
        let addr = addr.to_string();
        tokio::spawn(async move {
            peer.wait_for_disconnect().await;
            info!(addr = %addr, "closed peer connection");

            {
                let mut info = entry.lock();
                if info.status != PeerStatus::Banned {
                    info.status = PeerStatus::Disconnected;
                }
                info.peer = None;
            }
            pool.connected.lock().remove(&addr);

            drop(permit);
        });

        Ok(())
    }

    /// Register an inbound connection accepted by the listener.
    pub async fn accept(
        self: &Arc<Self>,
        stream: TcpStream,
        addr: SocketAddr,
        handler: Arc<dyn MessageHandler>,
    ) -> NetworkResult<Arc<Peer>> {
        let key = addr.to_string();
        if self.is_banned(&key) {
            return Err(NetworkError::PeerNotFound(key));
        }

        let Ok(permit) = self.slots.clone().try_acquire_owned() else {
            return Err(NetworkError::ConnectionClosed);
        };

        let peer = Peer::accept(
            stream,
            addr,
            &self.config,
            self.chain.total_difficulty(),
            &self.nonces,
            handler,
        )
        .await?;

        self.add(&key);
        let entry = self
            .peer_info(&key)
            .ok_or_else(|| NetworkError::PeerNotFound(key.clone()))?;
        self.register(&key, &entry, peer.clone());

        let pool = self.clone();
        let watcher_entry = entry.clone();
        let watcher_peer = peer.clone();
        tokio::spawn(async move {
            watcher_peer.wait_for_disconnect().await;

            {
                let mut info = watcher_entry.lock();
                if info.status != PeerStatus::Banned {
                    info.status = PeerStatus::Disconnected;
                }
                info.peer = None;
            }
            pool.connected.lock().remove(&watcher_peer.addr().to_string());

            drop(permit);
        });

        Ok(peer)
    }

    fn register(&self, addr: &str, entry: &PeerEntry, peer: Arc<Peer>) {
        {
            let mut info = entry.lock();
            let shake = peer.handshake();
            info.status = PeerStatus::Connected;
            info.protocol_version = shake.version;
            info.capabilities = shake.capabilities;
            info.total_difficulty = shake.total_difficulty;
            info.user_agent = shake.user_agent.clone();
            info.peer = Some(peer);
            info.last_conn = SystemTime::now();
        }

        self.connected
            .lock()
            .insert(addr.to_string(), entry.clone());
    }
}
