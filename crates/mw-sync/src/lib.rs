//! # mw-sync
//!
//! Chain synchronization: the single dispatcher turning decoded peer
//! messages into chain and mempool calls, plus the behavioural contracts
//! (`Blockchain`, `Mempool`) those calls go through.
//!
//! Consensus failures from a peer ban it through the pool; conflicts with
//! current state are logged and forgiven. A failing header batch bans, a
//! failing single header does not.

mod error;
mod sync;
mod traits;

pub use error::{ChainError, StateError};
pub use sync::Syncer;
pub use traits::{Blockchain, ChainStatus, Mempool};
