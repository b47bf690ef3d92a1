//! Typed protocol messages and their body codecs.

use crate::{NetworkError, NetworkResult};
use bytes::{BufMut, Bytes, BytesMut};
use mw_consensus::ser::Reader;
use mw_consensus::{
    Block, BlockHeader, Capabilities, CompactBlock, ConsensusError, Difficulty, Hash, Locator,
    MsgType, Transaction, MAX_BLOCK_HEADERS, MAX_PEER_ADDRS,
};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::handshake::{Hand, Shake};

/// Serialize a socket address: a 1-byte family tag, the raw address bytes
/// and the port.
pub fn write_addr(buf: &mut BytesMut, addr: &SocketAddr) {
    match addr.ip() {
        IpAddr::V4(ip) => {
            buf.put_u8(0);
            buf.put_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            buf.put_u8(1);
            buf.put_slice(&ip.octets());
        }
    }
    buf.put_u16(addr.port());
}

/// Deserialize a socket address.
pub fn read_addr(r: &mut Reader) -> Result<SocketAddr, ConsensusError> {
    let ip = match r.u8()? {
        0 => IpAddr::V4(Ipv4Addr::from(r.fixed::<4>()?)),
        1 => IpAddr::V6(Ipv6Addr::from(r.fixed::<16>()?)),
        tag => return Err(ConsensusError::InvalidAddressFamily(tag)),
    };
    let port = r.u16()?;
    Ok(SocketAddr::new(ip, port))
}

/// Serialize a string: u64 length then UTF-8 bytes.
pub fn write_string(buf: &mut BytesMut, s: &str) {
    buf.put_u64(s.len() as u64);
    buf.put_slice(s.as_bytes());
}

/// Deserialize a string.
pub fn read_string(r: &mut Reader) -> Result<String, ConsensusError> {
    let len = r.u64()? as usize;
    let bytes = r.bytes(len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| ConsensusError::InvalidUtf8)
}

/// Keepalive request carrying the sender's chain state. A `Pong` has the
/// same shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    /// Total difficulty accumulated by the sender.
    pub total_difficulty: Difficulty,
    /// Total chain height of the sender.
    pub height: u64,
}

impl Ping {
    fn write(&self, buf: &mut BytesMut) {
        buf.put_u64(self.total_difficulty.to_num());
        buf.put_u64(self.height);
    }

    fn read(r: &mut Reader) -> Result<Self, ConsensusError> {
        Ok(Self {
            total_difficulty: Difficulty::from_num(r.u64()?),
            height: r.u64()?,
        })
    }
}

/// Error notification, usually followed by a connection close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerError {
    /// Error code.
    pub code: u32,
    /// Slightly more user friendly message.
    pub message: String,
}

/// A typed p2p message.
#[derive(Debug, Clone)]
pub enum Message {
    /// Error notification.
    Error(PeerError),
    /// First part of the handshake.
    Hand(Hand),
    /// Second part of the handshake.
    Shake(Shake),
    /// Keepalive request. Must be answered with a `Pong`.
    Ping(Ping),
    /// Keepalive response.
    Pong(Ping),
    /// Ask for addresses of peers with the given capabilities.
    GetPeerAddrs(Capabilities),
    /// Peer addresses we know of that are fresh enough.
    PeerAddrs(Vec<SocketAddr>),
    /// Ask for the headers following a locator.
    GetHeaders(Locator),
    /// A single block header.
    Header(BlockHeader),
    /// A batch of block headers.
    Headers(Vec<BlockHeader>),
    /// Ask for a block by hash.
    GetBlock(Hash),
    /// A full block.
    Block(Block),
    /// Ask for a compact block by hash.
    GetCompactBlock(Hash),
    /// A compact block.
    CompactBlock(CompactBlock),
    /// A transaction still in stem phase.
    StemTransaction(Transaction),
    /// A transaction being relayed.
    Transaction(Transaction),
    /// Ask for the txhashset archive at a given block.
    TxHashSetRequest {
        /// Block the archive is rooted at.
        hash: Hash,
        /// Height of that block.
        height: u64,
    },
    /// Announce a txhashset archive.
    TxHashSetArchive {
        /// Block the archive is rooted at.
        hash: Hash,
        /// Height of that block.
        height: u64,
        /// Size of the archive that follows, in bytes.
        bytes: u64,
    },
    /// Reason for banning the remote.
    BanReason(u32),
    /// Ask for a transaction by hash.
    GetTransaction(Hash),
    /// A single transaction kernel, referenced by its hash.
    TransactionKernel(Hash),
}

impl Message {
    /// The wire type of this message.
    pub fn msg_type(&self) -> MsgType {
        match self {
            Message::Error(_) => MsgType::Error,
            Message::Hand(_) => MsgType::Hand,
            Message::Shake(_) => MsgType::Shake,
            Message::Ping(_) => MsgType::Ping,
            Message::Pong(_) => MsgType::Pong,
            Message::GetPeerAddrs(_) => MsgType::GetPeerAddrs,
            Message::PeerAddrs(_) => MsgType::PeerAddrs,
            Message::GetHeaders(_) => MsgType::GetHeaders,
            Message::Header(_) => MsgType::Header,
            Message::Headers(_) => MsgType::Headers,
            Message::GetBlock(_) => MsgType::GetBlock,
            Message::Block(_) => MsgType::Block,
            Message::GetCompactBlock(_) => MsgType::GetCompactBlock,
            Message::CompactBlock(_) => MsgType::CompactBlock,
            Message::StemTransaction(_) => MsgType::StemTransaction,
            Message::Transaction(_) => MsgType::Transaction,
            Message::TxHashSetRequest { .. } => MsgType::TxHashSetRequest,
            Message::TxHashSetArchive { .. } => MsgType::TxHashSetArchive,
            Message::BanReason(_) => MsgType::BanReason,
            Message::GetTransaction(_) => MsgType::GetTransaction,
            Message::TransactionKernel(_) => MsgType::TransactionKernel,
        }
    }

    /// Serialize the message body.
    pub fn body_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Message::Error(e) => {
                buf.put_u32(e.code);
                write_string(&mut buf, &e.message);
            }
            Message::Hand(hand) => hand.write(&mut buf),
            Message::Shake(shake) => shake.write(&mut buf),
            Message::Ping(ping) | Message::Pong(ping) => ping.write(&mut buf),
            Message::GetPeerAddrs(caps) => buf.put_u32(caps.0),
            Message::PeerAddrs(addrs) => {
                debug_assert!(addrs.len() <= MAX_PEER_ADDRS);
                buf.put_u32(addrs.len() as u32);
                for addr in addrs {
                    write_addr(&mut buf, addr);
                }
            }
            Message::GetHeaders(locator) => locator.write(&mut buf),
            Message::Header(header) => header.write(&mut buf),
            Message::Headers(headers) => {
                debug_assert!(headers.len() <= MAX_BLOCK_HEADERS);
                buf.put_u16(headers.len() as u16);
                for header in headers {
                    header.write(&mut buf);
                }
            }
            Message::GetBlock(hash)
            | Message::GetCompactBlock(hash)
            | Message::GetTransaction(hash)
            | Message::TransactionKernel(hash) => buf.put_slice(hash.as_bytes()),
            Message::Block(block) => block.write(&mut buf),
            Message::CompactBlock(block) => block.write(&mut buf),
            Message::StemTransaction(tx) | Message::Transaction(tx) => tx.write(&mut buf),
            Message::TxHashSetRequest { hash, height } => {
                buf.put_slice(hash.as_bytes());
                buf.put_u64(*height);
            }
            Message::TxHashSetArchive {
                hash,
                height,
                bytes,
            } => {
                buf.put_slice(hash.as_bytes());
                buf.put_u64(*height);
                buf.put_u64(*bytes);
            }
            Message::BanReason(reason) => buf.put_u32(*reason),
        }
        buf.freeze()
    }

    /// Decode a message body of the given type, requiring the body to be
    /// consumed exactly.
    pub fn read_body(msg_type: MsgType, body: Bytes) -> NetworkResult<Self> {
        let mut r = Reader::new(body);

        let msg = match msg_type {
            MsgType::Error => Message::Error(PeerError {
                code: r.u32()?,
                message: read_string(&mut r)?,
            }),
            MsgType::Hand => Message::Hand(Hand::read(&mut r)?),
            MsgType::Shake => Message::Shake(Shake::read(&mut r)?),
            MsgType::Ping => Message::Ping(Ping::read(&mut r)?),
            MsgType::Pong => Message::Pong(Ping::read(&mut r)?),
            MsgType::GetPeerAddrs => Message::GetPeerAddrs(Capabilities(r.u32()?)),
            MsgType::PeerAddrs => {
                let count = r.u32()?;
                if count as usize > MAX_PEER_ADDRS {
                    return Err(NetworkError::Malformed(ConsensusError::TooMany {
                        collection: "peer addresses",
                        count: u64::from(count),
                        max: MAX_PEER_ADDRS as u64,
                    }));
                }
                let mut addrs = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    addrs.push(read_addr(&mut r)?);
                }
                Message::PeerAddrs(addrs)
            }
            MsgType::GetHeaders => Message::GetHeaders(Locator::read(&mut r)?),
            MsgType::Header => Message::Header(BlockHeader::read(&mut r)?),
            MsgType::Headers => {
                let count = r.u16()?;
                if count as usize > MAX_BLOCK_HEADERS {
                    return Err(NetworkError::Malformed(ConsensusError::TooMany {
                        collection: "block headers",
                        count: u64::from(count),
                        max: MAX_BLOCK_HEADERS as u64,
                    }));
                }
                let mut headers = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    headers.push(BlockHeader::read(&mut r)?);
                }
                Message::Headers(headers)
            }
            MsgType::GetBlock => Message::GetBlock(Hash(r.fixed()?)),
            MsgType::Block => Message::Block(Block::read(&mut r)?),
            MsgType::GetCompactBlock => Message::GetCompactBlock(Hash(r.fixed()?)),
            MsgType::CompactBlock => Message::CompactBlock(CompactBlock::read(&mut r)?),
            MsgType::StemTransaction => Message::StemTransaction(Transaction::read(&mut r)?),
            MsgType::Transaction => Message::Transaction(Transaction::read(&mut r)?),
            MsgType::TxHashSetRequest => Message::TxHashSetRequest {
                hash: Hash(r.fixed()?),
                height: r.u64()?,
            },
            MsgType::TxHashSetArchive => Message::TxHashSetArchive {
                hash: Hash(r.fixed()?),
                height: r.u64()?,
                bytes: r.u64()?,
            },
            MsgType::BanReason => Message::BanReason(r.u32()?),
            MsgType::GetTransaction => Message::GetTransaction(Hash(r.fixed()?)),
            MsgType::TransactionKernel => Message::TransactionKernel(Hash(r.fixed()?)),
        };

        r.expect_empty().map_err(NetworkError::Malformed)?;
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mw_consensus::{Proof, PROOF_SIZE};

    fn roundtrip(msg: Message) -> Message {
        let body = msg.body_bytes();
        Message::read_body(msg.msg_type(), body).unwrap()
    }

    fn test_header() -> BlockHeader {
        BlockHeader {
            version: 1,
            height: 5,
            timestamp: 1_535_000_000,
            previous: Hash::of(b"prev"),
            previous_root: Hash::of(b"prev root"),
            output_root: Hash::of(b"output root"),
            range_proof_root: Hash::of(b"proof root"),
            kernel_root: Hash::of(b"kernel root"),
            total_kernel_offset: Hash::ZERO,
            output_mmr_size: 7,
            kernel_mmr_size: 3,
            total_difficulty: Difficulty::from_num(1000),
            scaling_difficulty: 1,
            nonce: 77,
            pow: Proof::new(31, (1..=PROOF_SIZE as u32).map(|i| i * 2).collect()),
        }
    }

    #[test]
    fn ping_pong_roundtrip() {
        let ping = Ping {
            total_difficulty: Difficulty::from_num(500),
            height: 42,
        };
        assert!(matches!(
            roundtrip(Message::Ping(ping)),
            Message::Ping(p) if p == ping
        ));
        assert!(matches!(
            roundtrip(Message::Pong(ping)),
            Message::Pong(p) if p == ping
        ));
    }

    #[test]
    fn error_roundtrip() {
        let msg = Message::Error(PeerError {
            code: 100,
            message: "unsupported version".to_string(),
        });
        assert!(matches!(
            roundtrip(msg),
            Message::Error(e) if e.code == 100 && e.message == "unsupported version"
        ));
    }

    #[test]
    fn peer_addrs_roundtrip_v4_and_v6() {
        let addrs = vec![
            "10.0.0.1:13414".parse().unwrap(),
            "[2001:db8::1]:13414".parse().unwrap(),
        ];
        match roundtrip(Message::PeerAddrs(addrs.clone())) {
            Message::PeerAddrs(decoded) => assert_eq!(decoded, addrs),
            other => panic!("wrong message type: {:?}", other.msg_type()),
        }
    }

    #[test]
    fn peer_addrs_bound_enforced() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_PEER_ADDRS as u32 + 1);
        assert!(matches!(
            Message::read_body(MsgType::PeerAddrs, buf.freeze()),
            Err(NetworkError::Malformed(ConsensusError::TooMany { .. }))
        ));
    }

    #[test]
    fn headers_roundtrip_and_bound() {
        let headers = vec![test_header(), test_header()];
        match roundtrip(Message::Headers(headers.clone())) {
            Message::Headers(decoded) => assert_eq!(decoded, headers),
            other => panic!("wrong message type: {:?}", other.msg_type()),
        }

        let mut buf = BytesMut::new();
        buf.put_u16(MAX_BLOCK_HEADERS as u16 + 1);
        assert!(matches!(
            Message::read_body(MsgType::Headers, buf.freeze()),
            Err(NetworkError::Malformed(ConsensusError::TooMany { .. }))
        ));
    }

    #[test]
    fn hash_request_roundtrips() {
        let hash = Hash::of(b"wanted");
        for msg in [
            Message::GetBlock(hash),
            Message::GetCompactBlock(hash),
            Message::GetTransaction(hash),
            Message::TransactionKernel(hash),
        ] {
            let decoded = roundtrip(msg.clone());
            assert_eq!(decoded.msg_type(), msg.msg_type());
            assert_eq!(decoded.body_bytes(), msg.body_bytes());
        }
    }

    #[test]
    fn txhashset_messages_roundtrip() {
        let req = Message::TxHashSetRequest {
            hash: Hash::of(b"root"),
            height: 900,
        };
        assert_eq!(roundtrip(req.clone()).body_bytes(), req.body_bytes());

        let archive = Message::TxHashSetArchive {
            hash: Hash::of(b"root"),
            height: 900,
            bytes: 1 << 20,
        };
        assert_eq!(
            roundtrip(archive.clone()).body_bytes(),
            archive.body_bytes()
        );
    }

    #[test]
    fn get_peer_addrs_roundtrip() {
        match roundtrip(Message::GetPeerAddrs(Capabilities::FULL_NODE)) {
            Message::GetPeerAddrs(caps) => assert_eq!(caps, Capabilities::FULL_NODE),
            other => panic!("wrong message type: {:?}", other.msg_type()),
        }
    }

    #[test]
    fn locator_message_roundtrip() {
        let locator = Locator::new(vec![Hash::of(b"tip"), Hash::of(b"older")]);
        match roundtrip(Message::GetHeaders(locator.clone())) {
            Message::GetHeaders(decoded) => assert_eq!(decoded, locator),
            other => panic!("wrong message type: {:?}", other.msg_type()),
        }
    }

    #[test]
    fn header_message_roundtrip() {
        let header = test_header();
        match roundtrip(Message::Header(header.clone())) {
            Message::Header(decoded) => assert_eq!(decoded, header),
            other => panic!("wrong message type: {:?}", other.msg_type()),
        }
    }

    #[test]
    fn ban_reason_roundtrip() {
        assert!(matches!(
            roundtrip(Message::BanReason(4)),
            Message::BanReason(4)
        ));
    }
}
