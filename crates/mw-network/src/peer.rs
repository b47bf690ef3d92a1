//! A connected peer.
//!
//! Each peer owns two tasks: a reader that decodes framed messages and
//! dispatches them to the message handler, and a writer that drains the
//! bounded send queue. Teardown runs exactly once: the first close (or
//! task error) flips an atomic flag and signals the quit channel, both
//! tasks terminate, and the socket halves drop with them.

use crate::frame::{read_any_message, read_message, write_message};
use crate::handshake::{Hand, NonceRing, Shake};
use crate::message::{Message, PeerError, Ping};
use crate::{NetConfig, NetworkError, NetworkResult};
use async_trait::async_trait;
use mw_consensus::{
    Block, Capabilities, Difficulty, Hash, Locator, MsgType, Transaction, NET_UNSUPPORTED_VERSION,
    PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Receives every decoded message from a peer's reader task.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one message from `peer`. Returning an error disconnects the
    /// peer with the error as reason.
    async fn handle(&self, peer: Arc<Peer>, msg: Message) -> NetworkResult<()>;
}

/// What the remote told us during the handshake.
#[derive(Debug, Clone)]
pub struct HandshakeInfo {
    /// Protocol version of the remote.
    pub version: u32,
    /// Capabilities of the remote.
    pub capabilities: Capabilities,
    /// Total difficulty the remote claimed.
    pub total_difficulty: Difficulty,
    /// Software name and version of the remote.
    pub user_agent: String,
}

/// A participant of the p2p network.
pub struct Peer {
    addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    magic: [u8; 2],
    handshake: HandshakeInfo,

    send_tx: mpsc::Sender<Message>,
    quit_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,

    disconnect: AtomicBool,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl Peer {
    /// Dial `addr` and perform the connecting side of the handshake.
    ///
    /// `nonce` must come from the pool's nonce ring so the accepting side
    /// of this process can recognise a connection back to itself.
    pub async fn connect(
        addr: SocketAddr,
        config: &NetConfig,
        total_difficulty: Difficulty,
        nonce: u64,
        handler: Arc<dyn MessageHandler>,
    ) -> NetworkResult<Arc<Peer>> {
        let mut stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                NetworkError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connect timeout",
                ))
            })??;

        let hand = Hand {
            version: PROTOCOL_VERSION,
            capabilities: config.capabilities,
            nonce,
            total_difficulty,
            sender_addr: config.listen_addr,
            receiver_addr: addr,
            user_agent: config.user_agent.clone(),
        };
        write_message(&mut stream, &Message::Hand(hand), config.magic).await?;

        let (msg, _) = tokio::time::timeout(
            config.handshake_timeout,
            read_message(&mut stream, MsgType::Shake, config.magic),
        )
        .await
        .map_err(|_| {
            NetworkError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "handshake timeout",
            ))
        })??;
        let shake = match msg {
            Message::Shake(shake) => shake,
            _ => unreachable!("read_message checked the type"),
        };

        if shake.version != PROTOCOL_VERSION {
            return Err(NetworkError::IncompatibleProtocolVersion { got: shake.version });
        }

        info!(addr = %addr, agent = %shake.user_agent, "connected to peer");

        let handshake = HandshakeInfo {
            version: shake.version,
            capabilities: shake.capabilities,
            total_difficulty: shake.total_difficulty,
            user_agent: shake.user_agent,
        };
        Ok(Self::spawn(stream, addr, handshake, config, handler))
    }

    /// Perform the accepting side of the handshake on an inbound
    /// connection.
    pub async fn accept(
        mut stream: TcpStream,
        addr: SocketAddr,
        config: &NetConfig,
        total_difficulty: Difficulty,
        nonces: &parking_lot::Mutex<NonceRing>,
        handler: Arc<dyn MessageHandler>,
    ) -> NetworkResult<Arc<Peer>> {
        let (msg, _) = tokio::time::timeout(
            config.handshake_timeout,
            read_message(&mut stream, MsgType::Hand, config.magic),
        )
        .await
        .map_err(|_| {
            NetworkError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "handshake timeout",
            ))
        })??;
        let hand = match msg {
            Message::Hand(hand) => hand,
            _ => unreachable!("read_message checked the type"),
        };

        if nonces.lock().contains(hand.nonce) {
            return Err(NetworkError::SelfConnection);
        }

        if hand.version != PROTOCOL_VERSION {
            // Best effort notification before dropping the connection.
            let error = Message::Error(PeerError {
                code: NET_UNSUPPORTED_VERSION,
                message: format!("unsupported protocol version {}", hand.version),
            });
            let _ = write_message(&mut stream, &error, config.magic).await;
            return Err(NetworkError::IncompatibleProtocolVersion { got: hand.version });
        }

        let shake = Shake {
            version: PROTOCOL_VERSION,
            capabilities: config.capabilities,
            total_difficulty,
            user_agent: config.user_agent.clone(),
        };
        write_message(&mut stream, &Message::Shake(shake), config.magic).await?;

        info!(addr = %addr, agent = %hand.user_agent, "accepted peer");

        let handshake = HandshakeInfo {
            version: hand.version,
            capabilities: hand.capabilities,
            total_difficulty: hand.total_difficulty,
            user_agent: hand.user_agent,
        };
        Ok(Self::spawn(stream, addr, handshake, config, handler))
    }

    fn spawn(
        stream: TcpStream,
        addr: SocketAddr,
        handshake: HandshakeInfo,
        config: &NetConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> Arc<Peer> {
        let (send_tx, send_rx) = mpsc::channel(config.send_queue_size);
        let (quit_tx, quit_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);

        let local_addr = stream.local_addr().ok();
        let peer = Arc::new(Peer {
            addr,
            local_addr,
            magic: config.magic,
            handshake,
            send_tx,
            quit_tx,
            done_rx,
            disconnect: AtomicBool::new(false),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        });

        let (read_half, write_half) = stream.into_split();
        let reader = tokio::spawn(read_loop(
            read_half,
            quit_rx.clone(),
            handler,
            peer.clone(),
        ));
        let writer = tokio::spawn(write_loop(write_half, send_rx, quit_rx, peer.clone()));

        let monitor_peer = peer.clone();
        tokio::spawn(async move {
            let _ = tokio::join!(reader, writer);
            debug!(addr = %monitor_peer.addr, "peer tasks finished");
            let _ = done_tx.send(true);
        });

        peer
    }

    /// The remote address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Our side of the connection, when known.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// What the remote told us during the handshake.
    pub fn handshake(&self) -> &HandshakeInfo {
        &self.handshake
    }

    /// Total bytes written to the socket.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Total bytes read from the socket.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Whether the connection is still up.
    pub fn is_connected(&self) -> bool {
        !self.disconnect.load(Ordering::SeqCst)
    }

    /// Enqueue a message for the writer task. A no-op once shutdown has
    /// been signaled.
    pub async fn send(&self, msg: Message) {
        if self.disconnect.load(Ordering::SeqCst) {
            debug!(addr = %self.addr, "cannot send message, peer is shutting down");
            return;
        }

        if self.send_tx.send(msg).await.is_err() {
            debug!(addr = %self.addr, "send queue closed, dropping message");
        }
    }

    /// Send a keepalive carrying our chain state.
    pub async fn send_ping(&self, total_difficulty: Difficulty, height: u64) {
        self.send(Message::Ping(Ping {
            total_difficulty,
            height,
        }))
        .await;
    }

    /// Ask the remote for addresses of peers with `capabilities`.
    pub async fn send_peer_request(&self, capabilities: Capabilities) {
        self.send(Message::GetPeerAddrs(capabilities)).await;
    }

    /// Ask the remote for the headers following `locator`.
    pub async fn send_header_request(&self, locator: Locator) {
        self.send(Message::GetHeaders(locator)).await;
    }

    /// Ask the remote for a block by hash.
    pub async fn send_block_request(&self, hash: Hash) {
        self.send(Message::GetBlock(hash)).await;
    }

    /// Ask the remote for a compact block by hash.
    pub async fn send_compact_block_request(&self, hash: Hash) {
        self.send(Message::GetCompactBlock(hash)).await;
    }

    /// Send a full block to the remote.
    pub async fn send_block(&self, block: Block) {
        self.send(Message::Block(block)).await;
    }

    /// Relay a transaction to the remote.
    pub async fn send_transaction(&self, tx: Transaction) {
        self.send(Message::Transaction(tx)).await;
    }

    /// Begin teardown with `reason`. Only the first caller wins; returns
    /// whether this call initiated the teardown.
    pub fn close(&self, reason: &str) -> bool {
        if self
            .disconnect
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        info!(addr = %self.addr, reason, "disconnecting peer");
        let _ = self.quit_tx.send(true);
        true
    }

    /// Wait until both peer tasks have finished.
    pub async fn wait_for_disconnect(&self) {
        let mut done = self.done_rx.clone();
        while !*done.borrow() {
            if done.changed().await.is_err() {
                break;
            }
        }
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("addr", &self.addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    mut quit: watch::Receiver<bool>,
    handler: Arc<dyn MessageHandler>,
    peer: Arc<Peer>,
) {
    loop {
        tokio::select! {
            _ = quit.changed() => break,

            result = read_any_message(&mut read_half, peer.magic) => {
                match result {
                    Ok((msg, read)) => {
                        peer.bytes_received.fetch_add(read, Ordering::Relaxed);

                        if let Err(e) = handler.handle(peer.clone(), msg).await {
                            peer.close(&format!("dispatch failed: {e}"));
                            break;
                        }
                    }
                    Err(e) => {
                        peer.close(&format!("read failed: {e}"));
                        break;
                    }
                }
            }
        }
    }
}

async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut send_rx: mpsc::Receiver<Message>,
    mut quit: watch::Receiver<bool>,
    peer: Arc<Peer>,
) {
    loop {
        tokio::select! {
            _ = quit.changed() => break,

            maybe_msg = send_rx.recv() => {
                let Some(msg) = maybe_msg else { break };

                if peer.disconnect.load(Ordering::SeqCst) {
                    break;
                }

                match write_message(&mut write_half, &msg, peer.magic).await {
                    Ok(written) => {
                        peer.bytes_sent.fetch_add(written, Ordering::Relaxed);
                    }
                    Err(e) => {
                        warn!(addr = %peer.addr, error = %e, "write failed");
                        peer.close(&format!("write failed: {e}"));
                        break;
                    }
                }
            }
        }
    }
}
