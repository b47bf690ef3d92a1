//! # mw-consensus
//!
//! Consensus types, codecs and validation rules for a Mimblewimble chain.
//!
//! This crate provides:
//! - Blocks, headers, transactions and their wire codecs
//! - Proof-of-work serialization and header validation
//! - Difficulty retargeting over a median-time window
//! - The protocol constants shared with the networking layer
//!
//! Everything on the wire is big-endian and every repeated sequence is
//! sorted in lexicographical order of its element hashes.

mod block;
mod difficulty;
mod error;
mod id;
mod locator;
mod network;
mod proof;
pub mod ser;
mod transaction;

pub use block::{
    Block, BlockHeader, CompactBlock, Input, Output, TxKernel, COINBASE_KERNEL, COINBASE_OUTPUT,
};
pub use difficulty::{next_difficulty, Difficulty, MINIMUM_DIFFICULTY, ZERO_DIFFICULTY};
pub use error::ConsensusError;
pub use id::{Hash, ShortId};
pub use locator::Locator;
pub use network::{
    Capabilities, MsgType, HEADER_LEN, LEGACY_MAGIC_CODE, MAGIC_CODE, MAX_BLOCK_HEADERS,
    MAX_LOCATORS, MAX_MSG_LEN, MAX_PEER_ADDRS, NET_UNSUPPORTED_VERSION, PROTOCOL_VERSION,
};
pub use proof::Proof;
pub use transaction::Transaction;

pub use mw_crypto::{MAX_PROOF_SIZE, PEDERSEN_COMMITMENT_SIZE};

/// Size of a block hash in bytes.
pub const BLOCK_HASH_SIZE: usize = 32;

/// Size of a compact-block short id in bytes.
pub const SHORT_ID_SIZE: usize = 6;

/// Size of the stored hash of a switch commitment.
pub const SWITCH_COMMIT_HASH_SIZE: usize = 20;

/// A grin is divisible to 10^9, following the SI prefixes.
pub const GRIN_BASE: u64 = 1_000_000_000;

/// The block subsidy amount.
pub const REWARD: u64 = 60 * GRIN_BASE;

/// Number of blocks before a coinbase matures and can be spent.
pub const COINBASE_MATURITY: u64 = 1000;

/// Block interval, in seconds, the network tunes its next target for.
pub const BLOCK_TIME_SEC: i64 = 60;

/// Cuckoo-cycle proof size (cycle length).
pub const PROOF_SIZE: usize = 42;

/// Default cuckoo graph size shift of the legacy deployment.
pub const DEFAULT_SIZE_SHIFT: u8 = 30;

/// Minimum edge bits of the primary proof-of-work class.
pub const DEFAULT_MIN_EDGE_BITS: u8 = 31;

/// Edge bits of the secondary proof-of-work class.
pub const SECOND_POW_EDGE_BITS: u8 = 29;

/// Default cuckoo easiness of the legacy deployment, as a percentage.
pub const EASINESS: u64 = 50;

/// Maximum number of coinbase outputs in a valid block.
pub const MAX_BLOCK_COINBASE_OUTPUTS: usize = 1;

/// Maximum number of coinbase kernels in a valid block.
pub const MAX_BLOCK_COINBASE_KERNELS: usize = 1;

/// Maximum number of inputs, outputs or kernels in a single body.
pub const MAX_TX_PARTS: u64 = 1_000_000;

/// Weight of an input against the block capacity.
pub const BLOCK_INPUT_WEIGHT: u64 = 1;

/// Weight of an output against the block capacity.
pub const BLOCK_OUTPUT_WEIGHT: u64 = 10;

/// Weight of a kernel against the block capacity.
pub const BLOCK_KERNEL_WEIGHT: u64 = 2;

/// Total maximum block weight.
pub const MAX_BLOCK_WEIGHT: u64 = 80_000;

/// A hard fork is scheduled every this many blocks.
pub const HARD_FORK_INTERVAL: u64 = 250_000;

/// Number of blocks used to calculate difficulty adjustments.
pub const DIFFICULTY_ADJUST_WINDOW: usize = 23;

/// Time window in blocks for the block time median.
pub const MEDIAN_TIME_WINDOW: usize = 11;

/// Average time span of the difficulty adjustment window, in seconds.
pub const BLOCK_TIME_WINDOW: i64 = DIFFICULTY_ADJUST_WINDOW as i64 * BLOCK_TIME_SEC;

/// Maximum time span used for difficulty adjustments.
pub const UPPER_TIME_BOUND: i64 = BLOCK_TIME_WINDOW * 4 / 3;

/// Minimum time span used for difficulty adjustments.
pub const LOWER_TIME_BOUND: i64 = BLOCK_TIME_WINDOW * 5 / 6;

/// The first eight bytes of the maximum target a proof hash is divided
/// into.
pub const MAX_TARGET: [u8; 8] = [0x0f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];

/// Whether `version` is the scheduled block version at `height`.
pub fn valid_version(height: u64, version: u16) -> bool {
    if height < HARD_FORK_INTERVAL {
        version == 1
    } else if height < 2 * HARD_FORK_INTERVAL {
        version == 2
    } else {
        false
    }
}
