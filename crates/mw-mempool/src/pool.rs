//! The transaction pool.

use mw_consensus::{Hash, Transaction};
use mw_crypto::{RangeProofVerifier, StructuralVerifier};
use mw_sync::{ChainError, Mempool, StateError};
use std::collections::HashMap;
use tracing::debug;

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of transactions held.
    pub max_pool_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: 50_000,
        }
    }
}

/// Validated transactions waiting to enter a block.
pub struct TransactionPool {
    config: PoolConfig,
    txs: HashMap<Hash, Transaction>,
    verifier: Box<dyn RangeProofVerifier>,
}

impl TransactionPool {
    /// An empty pool.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            txs: HashMap::new(),
            verifier: Box::new(StructuralVerifier),
        }
    }

    /// Replace the range-proof verification backend.
    pub fn with_verifier(mut self, verifier: Box<dyn RangeProofVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Number of transactions held.
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Whether the pool holds a transaction.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.txs.contains_key(hash)
    }

    /// All transactions, highest total fee first.
    pub fn fee_ordered(&self) -> Vec<&Transaction> {
        let mut txs: Vec<&Transaction> = self.txs.values().collect();
        txs.sort_by_key(|tx| std::cmp::Reverse(tx.total_fees()));
        txs
    }

    /// Drop every transaction contained in `hashes`, typically after a
    /// block confirmed them.
    pub fn remove_all(&mut self, hashes: &[Hash]) {
        for hash in hashes {
            self.txs.remove(hash);
        }
    }
}

impl Default for TransactionPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl Mempool for TransactionPool {
    fn process_tx(&mut self, tx: Transaction) -> Result<(), ChainError> {
        let hash = tx.hash();

        if self.txs.contains_key(&hash) {
            return Err(StateError::AlreadyKnown(hash).into());
        }
        if self.txs.len() >= self.config.max_pool_size {
            return Err(StateError::PoolFull.into());
        }

        tx.validate(self.verifier.as_ref())?;

        debug!(tx = %hash, fee = tx.total_fees(), "transaction admitted");
        self.txs.insert(hash, tx);
        Ok(())
    }
}
