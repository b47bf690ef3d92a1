//! Block storage behind the chain.

use mw_consensus::{Block, Hash};
use std::collections::{BTreeMap, HashMap};

/// Identify a block by hash, by height, or both.
#[derive(Debug, Clone, Default)]
pub struct BlockId {
    /// Block hash, when known.
    pub hash: Option<Hash>,
    /// Block height, when known.
    pub height: Option<u64>,
}

impl BlockId {
    /// Identify by hash.
    pub fn by_hash(hash: Hash) -> Self {
        Self {
            hash: Some(hash),
            height: None,
        }
    }

    /// Identify by height.
    pub fn by_height(height: u64) -> Self {
        Self {
            hash: None,
            height: Some(height),
        }
    }
}

/// Storage the chain keeps its blocks in.
pub trait ChainStore: Send + Sync {
    /// Store a block.
    fn add_block(&mut self, block: &Block);

    /// Remove a block.
    fn del_block(&mut self, id: &BlockId);

    /// Fetch a block.
    fn get_block(&self, id: &BlockId) -> Option<Block>;

    /// The stored block with the greatest height.
    fn get_last_block(&self) -> Option<Block>;

    /// Walk forward from the identified block, inclusive, by ascending
    /// height, up to `limit` blocks.
    fn from(&self, id: &BlockId, limit: usize) -> Vec<Block>;
}

/// In-memory store indexed by hash and height.
#[derive(Default)]
pub struct MemoryStore {
    by_hash: HashMap<Hash, Block>,
    by_height: BTreeMap<u64, Hash>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve(&self, id: &BlockId) -> Option<&Block> {
        if let Some(hash) = &id.hash {
            let block = self.by_hash.get(hash)?;
            if let Some(height) = id.height {
                if block.header.height != height {
                    return None;
                }
            }
            return Some(block);
        }

        let height = id.height?;
        let hash = self.by_height.get(&height)?;
        self.by_hash.get(hash)
    }
}

impl ChainStore for MemoryStore {
    fn add_block(&mut self, block: &Block) {
        let hash = block.hash();
        self.by_height.insert(block.header.height, hash);
        self.by_hash.insert(hash, block.clone());
    }

    fn del_block(&mut self, id: &BlockId) {
        let Some(block) = self.resolve(id) else { return };
        let hash = block.hash();
        let height = block.header.height;

        self.by_hash.remove(&hash);
        if self.by_height.get(&height) == Some(&hash) {
            self.by_height.remove(&height);
        }
    }

    fn get_block(&self, id: &BlockId) -> Option<Block> {
        self.resolve(id).cloned()
    }

    fn get_last_block(&self) -> Option<Block> {
        let (_, hash) = self.by_height.iter().next_back()?;
        self.by_hash.get(hash).cloned()
    }

    fn from(&self, id: &BlockId, limit: usize) -> Vec<Block> {
        let Some(start) = self.resolve(id) else {
            return Vec::new();
        };

        self.by_height
            .range(start.header.height..)
            .take(limit)
            .filter_map(|(_, hash)| self.by_hash.get(hash).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis;

    fn block_at(height: u64, previous: Hash) -> Block {
        let mut block = genesis::mainnet();
        block.header.height = height;
        block.header.previous = previous;
        block.header.nonce = height;
        block.header.pow.nonces[0] = height as u32;
        block
    }

    #[test]
    fn stores_and_walks_forward() {
        let mut store = MemoryStore::new();

        let b0 = block_at(0, Hash::ZERO);
        let b1 = block_at(1, b0.hash());
        let b2 = block_at(2, b1.hash());
        for b in [&b0, &b1, &b2] {
            store.add_block(b);
        }

        assert_eq!(store.get_last_block().unwrap().hash(), b2.hash());
        assert_eq!(
            store.get_block(&BlockId::by_hash(b1.hash())).unwrap().hash(),
            b1.hash()
        );
        assert_eq!(
            store.get_block(&BlockId::by_height(2)).unwrap().hash(),
            b2.hash()
        );

        let walked = store.from(&BlockId::by_height(1), 10);
        assert_eq!(walked.len(), 2);
        assert_eq!(walked[0].hash(), b1.hash());
        assert_eq!(walked[1].hash(), b2.hash());

        let limited = store.from(&BlockId::by_height(0), 2);
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn delete_removes_both_indexes() {
        let mut store = MemoryStore::new();
        let b0 = block_at(0, Hash::ZERO);
        store.add_block(&b0);

        store.del_block(&BlockId::by_hash(b0.hash()));
        assert!(store.get_block(&BlockId::by_height(0)).is_none());
        assert!(store.get_last_block().is_none());
    }

    #[test]
    fn mismatched_hash_and_height_resolves_to_nothing() {
        let mut store = MemoryStore::new();
        let b0 = block_at(0, Hash::ZERO);
        store.add_block(&b0);

        let id = BlockId {
            hash: Some(b0.hash()),
            height: Some(5),
        };
        assert!(store.get_block(&id).is_none());
    }
}
