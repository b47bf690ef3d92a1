//! # mw-chain
//!
//! An in-memory chain implementing the blockchain facade: tip tracking,
//! block acceptance against the parent (timestamps, accumulated
//! difficulty, retarget floor, kernel sums) and locator-driven header
//! serving, over a pluggable block store.

mod chain;
pub mod genesis;
mod store;

pub use chain::{Chain, ChainOptions};
pub use store::{BlockId, ChainStore, MemoryStore};
