//! The chain: tip tracking and block acceptance.

use crate::store::{BlockId, ChainStore};
use mw_consensus::{
    next_difficulty, Block, BlockHeader, ConsensusError, Difficulty, Hash, Locator,
    DIFFICULTY_ADJUST_WINDOW, MAX_BLOCK_HEADERS, MAX_LOCATORS, MEDIAN_TIME_WINDOW,
};
use mw_crypto::{offset_delta, RangeProofVerifier, StructuralVerifier};
use mw_sync::{Blockchain, ChainError, StateError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Chain processing options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainOptions {
    /// Skip the proof-of-work dependent checks (cycle verification and
    /// difficulty comparisons). Meant for tests with fabricated blocks.
    pub skip_pow: bool,
}

/// An in-memory chain over a pluggable block store.
pub struct Chain {
    store: Box<dyn ChainStore>,
    genesis: Block,
    head: Block,
    height: u64,
    total_difficulty: Difficulty,
    options: ChainOptions,
    verifier: Box<dyn RangeProofVerifier>,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl Chain {
    /// Create a chain seeded with `genesis`, restoring the tip from the
    /// store when it already holds blocks.
    pub fn new(genesis: Block, store: Box<dyn ChainStore>) -> Self {
        Self::with_options(genesis, store, ChainOptions::default())
    }

    /// Create a chain with explicit processing options.
    pub fn with_options(genesis: Block, mut store: Box<dyn ChainStore>, options: ChainOptions) -> Self {
        if store.get_last_block().is_none() {
            store.add_block(&genesis);
        }

        let head = store.get_last_block().expect("store holds at least genesis");
        let height = head.header.height;
        let total_difficulty = head.header.total_difficulty;

        Self {
            store,
            genesis,
            head,
            height,
            total_difficulty,
            options,
            verifier: Box::new(StructuralVerifier),
        }
    }

    /// Replace the range-proof verification backend.
    pub fn with_verifier(mut self, verifier: Box<dyn RangeProofVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// The current tip.
    pub fn head(&self) -> &Block {
        &self.head
    }

    /// The difficulty the next block must meet, retargeted over the
    /// window ending at `parent`.
    fn retarget_difficulty(&self, parent: &BlockHeader) -> Difficulty {
        let limit = DIFFICULTY_ADJUST_WINDOW + MEDIAN_TIME_WINDOW;
        let from_height = parent.height.saturating_sub(limit as u64 - 1);

        let blocks = self.store.from(&BlockId::by_height(from_height), limit);
        let window: Vec<(i64, Difficulty)> = blocks
            .iter()
            .filter(|b| b.header.height <= parent.height)
            .rev()
            .map(|b| (b.header.timestamp, b.header.pow.to_difficulty()))
            .collect();

        next_difficulty(&window)
    }
}

impl Blockchain for Chain {
    fn genesis(&self) -> Block {
        self.genesis.clone()
    }

    fn total_difficulty(&self) -> Difficulty {
        self.total_difficulty
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn locator(&self) -> Locator {
        let mut hashes = Vec::with_capacity(MAX_LOCATORS);
        let mut height = self.height;
        let mut step = 1u64;

        while hashes.len() < MAX_LOCATORS - 1 {
            if let Some(block) = self.store.get_block(&BlockId::by_height(height)) {
                hashes.push(block.hash());
            }
            if height == 0 {
                break;
            }
            height = height.saturating_sub(step);
            if hashes.len() > 4 {
                step *= 2;
            }
        }

        let genesis_hash = self.genesis.hash();
        if hashes.last() != Some(&genesis_hash) {
            hashes.push(genesis_hash);
        }

        Locator::new(hashes)
    }

    fn block_headers(&self, locator: &Locator) -> Vec<BlockHeader> {
        let hashes = locator.hashes.iter().take(MAX_LOCATORS);

        for hash in hashes {
            // The requester is already at our tip.
            if *hash == self.head.hash() {
                return Vec::new();
            }

            let blocks = self
                .store
                .from(&BlockId::by_hash(*hash), MAX_BLOCK_HEADERS + 1);
            if !blocks.is_empty() {
                return blocks.into_iter().skip(1).map(|b| b.header).collect();
            }
        }

        Vec::new()
    }

    fn block(&self, hash: &Hash) -> Option<Block> {
        self.store.get_block(&BlockId::by_hash(*hash))
    }

    fn process_headers(&mut self, headers: &[BlockHeader]) -> Result<(), ChainError> {
        let now = unix_now();

        for pair in headers.windows(2) {
            if pair[1].previous != pair[0].hash() {
                return Err(ConsensusError::BrokenHeaderChain.into());
            }
        }

        for header in headers {
            header.validate_shape_at(now)?;
            if !self.options.skip_pow {
                header.validate_pow()?;
            }
        }

        Ok(())
    }

    fn process_block(&mut self, block: &Block) -> Result<(), ChainError> {
        let hash = block.hash();
        info!(
            height = block.header.height,
            total_difficulty = %block.header.total_difficulty,
            "processing block"
        );

        if self.store.get_block(&BlockId::by_hash(hash)).is_some() {
            return Err(StateError::AlreadyKnown(hash).into());
        }

        let now = unix_now();
        block.header.validate_shape_at(now)?;
        if !self.options.skip_pow {
            block.header.validate_pow()?;
        }

        // Everything below needs the parent.
        let Some(prev_height) = block.header.height.checked_sub(1) else {
            return Err(StateError::AlreadyKnown(hash).into());
        };
        let parent_id = BlockId {
            hash: Some(block.header.previous),
            height: Some(prev_height),
        };
        let parent = self
            .store
            .get_block(&parent_id)
            .ok_or(StateError::Orphan(block.header.previous))?;

        if block.header.timestamp <= parent.header.timestamp {
            return Err(ConsensusError::TimestampBeforeParent(block.header.timestamp).into());
        }

        let expected = parent.header.total_difficulty + parent.header.pow.to_difficulty();
        if block.header.total_difficulty != expected {
            return Err(
                ConsensusError::WrongTotalDifficulty(block.header.total_difficulty.to_num())
                    .into(),
            );
        }

        if !self.options.skip_pow {
            let required = self.retarget_difficulty(&parent.header);
            let got = block.header.pow.to_difficulty();
            if got < required {
                return Err(StateError::DifficultyBelowRetarget {
                    got: got.to_num(),
                    required: required.to_num(),
                }
                .into());
            }
        }

        let offset = offset_delta(
            block.header.total_kernel_offset.as_bytes(),
            parent.header.total_kernel_offset.as_bytes(),
        );
        block.validate_body(self.verifier.as_ref(), &offset)?;

        self.store.add_block(block);

        if block.header.previous == self.head.hash() {
            self.head = block.clone();
            self.height = block.header.height;
            self.total_difficulty = block.header.total_difficulty;
            info!(height = self.height, "chain advanced");
        } else if block.header.total_difficulty > self.total_difficulty {
            // TODO: reorg onto the heavier fork once header-first sync
            // lands; for now the fork is stored but the tip stays.
            warn!(
                height = block.header.height,
                "stored heavier side-chain block without reorganizing"
            );
        }

        Ok(())
    }
}
