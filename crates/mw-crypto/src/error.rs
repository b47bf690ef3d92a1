//! Crypto error types.

use thiserror::Error;

/// Errors from commitment and signature handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Commitment bytes do not decode to a curve point.
    #[error("invalid commitment encoding")]
    InvalidCommitment,

    /// Public key bytes do not decode to a curve point.
    #[error("invalid public key encoding")]
    InvalidPublicKey,

    /// Range proof exceeds the maximum size or is empty.
    #[error("invalid range proof length: {0}")]
    InvalidProofLength(usize),
}
