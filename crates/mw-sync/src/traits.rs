//! Behavioural contracts the synchronizer depends on.
//!
//! The chain and mempool stay behind these traits so the protocol side is
//! testable with in-memory fakes. Readers go through a shared lock; block
//! and header processing take the writer side.

use crate::ChainError;
use mw_consensus::{Block, BlockHeader, Difficulty, Hash, Locator, Transaction};
use mw_network::ChainSummary;
use parking_lot::RwLock;
use std::sync::Arc;

/// The blockchain facade.
pub trait Blockchain: Send + Sync {
    /// The genesis block.
    fn genesis(&self) -> Block;

    /// Current accumulated total difficulty.
    fn total_difficulty(&self) -> Difficulty;

    /// Current chain height.
    fn height(&self) -> u64;

    /// A locator for our own chain: recent block hashes, newest first,
    /// thinning out towards genesis.
    fn locator(&self) -> Locator;

    /// Up to the wire maximum of headers following the first locator hash
    /// found in the chain.
    fn block_headers(&self, locator: &Locator) -> Vec<BlockHeader>;

    /// A block by hash, when we have it.
    fn block(&self, hash: &Hash) -> Option<Block>;

    /// Validate and apply a batch of headers.
    fn process_headers(&mut self, headers: &[BlockHeader]) -> Result<(), ChainError>;

    /// Validate and apply a full block.
    fn process_block(&mut self, block: &Block) -> Result<(), ChainError>;
}

/// The transaction pool facade.
pub trait Mempool: Send + Sync {
    /// Validate and admit a transaction.
    fn process_tx(&mut self, tx: Transaction) -> Result<(), ChainError>;
}

/// Adapter exposing a locked chain as the summary the network layer
/// needs for handshakes and pings.
pub struct ChainStatus<C: Blockchain>(pub Arc<RwLock<C>>);

impl<C: Blockchain> ChainSummary for ChainStatus<C> {
    fn total_difficulty(&self) -> Difficulty {
        self.0.read().total_difficulty()
    }

    fn height(&self) -> u64 {
        self.0.read().height()
    }
}
