//! Consensus error types.

use mw_crypto::CryptoError;
use thiserror::Error;

/// Errors from decoding or validating consensus objects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// Ran out of bytes while decoding.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A decoded body left unconsumed bytes.
    #[error("trailing bytes after body ({0} left)")]
    TrailingBytes(usize),

    /// An address family tag outside the enumeration.
    #[error("invalid address family tag: {0}")]
    InvalidAddressFamily(u8),

    /// A string field was not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    /// A length-prefixed collection exceeds its bound.
    #[error("too many {collection}: {count} (max {max})")]
    TooMany {
        collection: &'static str,
        count: u64,
        max: u64,
    },

    /// A sequence violates the sorted-by-hash wire rule.
    #[error("{0} are not sorted")]
    Unsorted(&'static str),

    /// Header version does not match the fork schedule.
    #[error("invalid block version {version} at height {height}")]
    InvalidBlockVersion { version: u16, height: u64 },

    /// Header timestamp too far in the future.
    #[error("block timestamp {0} too far in the future")]
    TimestampTooFarInFuture(i64),

    /// Header timestamp not strictly after its parent's.
    #[error("block timestamp {0} not after parent")]
    TimestampBeforeParent(i64),

    /// Accumulated difficulty does not extend the parent's.
    #[error("wrong block total difficulty {0}")]
    WrongTotalDifficulty(u64),

    /// Cuckoo graph too small for the primary proof-of-work class.
    #[error("cuckoo size too small: {0}")]
    CuckooSizeTooSmall(u8),

    /// Edge bits outside the representable range.
    #[error("invalid cuckoo graph size: {0}")]
    InvalidEdgeBits(u8),

    /// Primary proof-of-work requires a scaling factor of one.
    #[error("invalid scaling difficulty: {0}")]
    InvalidScalingDifficulty(u32),

    /// The cycle nonces fail Cuckoo verification.
    #[error("invalid proof of work")]
    InvalidPow,

    /// Consecutive headers in a batch do not link up.
    #[error("headers do not form a chain")]
    BrokenHeaderChain,

    /// Proof difficulty below the required difficulty.
    #[error("proof difficulty {got} below required {required}")]
    DifficultyTooLow { got: u64, required: u64 },

    /// A block needs at least one coinbase output and kernel.
    #[error("block has no coinbase output or kernel")]
    MissingCoinbase,

    /// A transaction needs at least one kernel.
    #[error("transaction has no kernels")]
    MissingKernel,

    /// Coinbase output count above the consensus limit.
    #[error("too many coinbase outputs")]
    TooManyCoinbaseOutputs,

    /// Coinbase kernel count above the consensus limit.
    #[error("too many coinbase kernels")]
    TooManyCoinbaseKernels,

    /// Block weight above the consensus limit.
    #[error("block weight {0} exceeds maximum")]
    BlockTooHeavy(u64),

    /// A range proof failed verification.
    #[error("invalid range proof")]
    InvalidRangeProof,

    /// A kernel excess signature failed verification.
    #[error("invalid kernel signature")]
    InvalidKernelSignature,

    /// Commitment sums do not balance against the kernel excesses.
    #[error("kernel sums do not balance")]
    KernelSumMismatch,

    /// Commitment or signature bytes were malformed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
