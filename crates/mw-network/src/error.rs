//! Network error types.

use mw_consensus::ConsensusError;
use thiserror::Error;

/// Errors from the wire protocol and connection management.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// I/O error on the socket.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame header carried the wrong magic code.
    #[error("invalid magic code: {0:02x?}")]
    BadMagic([u8; 2]),

    /// Frame header carried a type outside the enumeration.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    /// A message of a different type than expected arrived.
    #[error("unexpected message type: {got}")]
    UnexpectedMessageType { got: u8 },

    /// Declared body length above the protocol maximum.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: u64, max: u64 },

    /// The remote speaks an incompatible protocol version.
    #[error("incompatible protocol version: {got}")]
    IncompatibleProtocolVersion { got: u32 },

    /// The remote handed us one of our own recent handshake nonces.
    #[error("connection to ourselves detected by nonce")]
    SelfConnection,

    /// A typed body failed to decode or broke a bound.
    #[error("malformed message body: {0}")]
    Malformed(#[from] ConsensusError),

    /// The connection was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer is not in the table.
    #[error("peer not found: {0}")]
    PeerNotFound(String),
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
