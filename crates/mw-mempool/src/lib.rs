//! # mw-mempool
//!
//! An in-memory transaction pool implementing the mempool facade:
//! transactions are validated on entry, deduplicated by hash and bounded
//! by a configurable capacity.

mod pool;

pub use pool::{PoolConfig, TransactionPool};
