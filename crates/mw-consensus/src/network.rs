//! Protocol-level constants shared between the wire layer and consensus.

/// Magic code expected in the header of every message.
pub const MAGIC_CODE: [u8; 2] = [0x54, 0x34];

/// Magic code of the legacy deployment.
pub const LEGACY_MAGIC_CODE: [u8; 2] = [0x1e, 0xc5];

/// Version of the p2p protocol.
pub const PROTOCOL_VERSION: u32 = 1;

/// Size in bytes of a message header.
pub const HEADER_LEN: u64 = 11;

/// Maximum size we are willing to accept for any message. Enforced by the
/// networking layer only, for DoS protection.
pub const MAX_MSG_LEN: u64 = 20_000_000;

/// Maximum number of hashes in a block header locator request.
pub const MAX_LOCATORS: usize = 14;

/// Maximum number of block headers a peer should ever send.
pub const MAX_BLOCK_HEADERS: usize = 512;

/// Maximum number of peer addresses a peer should ever send.
pub const MAX_PEER_ADDRS: usize = 256;

/// Error code sent when the remote protocol version is unsupported.
pub const NET_UNSUPPORTED_VERSION: u32 = 100;

/// Types of p2p messages, in wire discriminant order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    /// Error notification, usually followed by a close.
    Error = 0,
    /// First part of the handshake.
    Hand = 1,
    /// Second part of the handshake.
    Shake = 2,
    /// Keepalive request.
    Ping = 3,
    /// Keepalive response.
    Pong = 4,
    /// Ask for peer addresses.
    GetPeerAddrs = 5,
    /// Peer addresses response.
    PeerAddrs = 6,
    /// Ask for headers following a locator.
    GetHeaders = 7,
    /// A single header.
    Header = 8,
    /// A batch of headers.
    Headers = 9,
    /// Ask for a block by hash.
    GetBlock = 10,
    /// A full block.
    Block = 11,
    /// Ask for a compact block by hash.
    GetCompactBlock = 12,
    /// A compact block.
    CompactBlock = 13,
    /// A transaction still in stem phase.
    StemTransaction = 14,
    /// A transaction.
    Transaction = 15,
    /// Ask for the txhashset archive.
    TxHashSetRequest = 16,
    /// Txhashset archive announcement.
    TxHashSetArchive = 17,
    /// Reason for a ban.
    BanReason = 18,
    /// Ask for a transaction by hash.
    GetTransaction = 19,
    /// A single transaction kernel.
    TransactionKernel = 20,
}

impl TryFrom<u8> for MsgType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        Ok(match value {
            0 => MsgType::Error,
            1 => MsgType::Hand,
            2 => MsgType::Shake,
            3 => MsgType::Ping,
            4 => MsgType::Pong,
            5 => MsgType::GetPeerAddrs,
            6 => MsgType::PeerAddrs,
            7 => MsgType::GetHeaders,
            8 => MsgType::Header,
            9 => MsgType::Headers,
            10 => MsgType::GetBlock,
            11 => MsgType::Block,
            12 => MsgType::GetCompactBlock,
            13 => MsgType::CompactBlock,
            14 => MsgType::StemTransaction,
            15 => MsgType::Transaction,
            16 => MsgType::TxHashSetRequest,
            17 => MsgType::TxHashSetArchive,
            18 => MsgType::BanReason,
            19 => MsgType::GetTransaction,
            20 => MsgType::TransactionKernel,
            other => return Err(other),
        })
    }
}

/// Capability bits a node advertises during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(pub u32);

impl Capabilities {
    /// We don't know (yet) what the peer can do.
    pub const UNKNOWN: Capabilities = Capabilities(0);
    /// Full archival node: has the whole history without any pruning.
    pub const FULL_HIST: Capabilities = Capabilities(1 << 0);
    /// Can provide block headers and the UTXO set for a recent height.
    pub const UTXO_HIST: Capabilities = Capabilities(1 << 1);
    /// Can provide a list of healthy peers.
    pub const PEER_LIST: Capabilities = Capabilities(1 << 2);
    /// Fast-sync capable node.
    pub const FAST_SYNC_NODE: Capabilities =
        Capabilities(Self::UTXO_HIST.0 | Self::PEER_LIST.0);
    /// Everything.
    pub const FULL_NODE: Capabilities =
        Capabilities(Self::FULL_HIST.0 | Self::UTXO_HIST.0 | Self::PEER_LIST.0);

    /// Whether every capability in `required` is present.
    pub fn contains(self, required: Capabilities) -> bool {
        self.0 & required.0 == required.0
    }
}
