//! Errors crossing the chain facade.

use mw_consensus::{ConsensusError, Hash};
use thiserror::Error;

/// Benign conflicts with current chain state. These are logged, never
/// banned for.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The parent block is not in the chain (yet).
    #[error("previous block {0} not found")]
    Orphan(Hash),

    /// We already have this block.
    #[error("block {0} already known")]
    AlreadyKnown(Hash),

    /// Proof difficulty below the retargeted minimum.
    #[error("difficulty {got} below retargeted minimum {required}")]
    DifficultyBelowRetarget {
        /// Difficulty the proof achieves.
        got: u64,
        /// Difficulty the retarget demands.
        required: u64,
    },

    /// The transaction pool is at capacity.
    #[error("transaction pool is full")]
    PoolFull,
}

/// Outcome of handing a block, header batch or transaction to the chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Consensus rules were violated; the sender is misbehaving.
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// The object conflicts with current state; nothing malicious.
    #[error(transparent)]
    State(#[from] StateError),
}
