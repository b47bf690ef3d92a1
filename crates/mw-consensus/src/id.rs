//! Block hashes and compact-block short ids.

use crate::{BLOCK_HASH_SIZE, SHORT_ID_SIZE};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use mw_pow::siphash24_bytes;

/// A 32-byte identifier: block hashes, merkle roots, kernel offsets.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash(pub [u8; BLOCK_HASH_SIZE]);

impl Hash {
    /// The all-zero hash.
    pub const ZERO: Hash = Hash([0u8; BLOCK_HASH_SIZE]);

    /// BLAKE2b-256 of `data`.
    pub fn of(data: &[u8]) -> Self {
        let digest = Blake2b::<U32>::digest(data);
        let mut out = [0u8; BLOCK_HASH_SIZE];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; BLOCK_HASH_SIZE] {
        &self.0
    }

    /// First eight bytes as a big-endian integer, used for difficulty.
    pub fn first_u64(&self) -> u64 {
        u64::from_be_bytes(self.0[..8].try_into().expect("fixed slice length"))
    }

    /// Derive the 6-byte short id of this hash within the block identified
    /// by `block_hash`. The first sixteen bytes of the block hash key a
    /// SipHash-2-4 over the full hash; the low six bytes of the digest,
    /// little-endian, form the id.
    pub fn short_id(&self, block_hash: &Hash) -> ShortId {
        let k0 = u64::from_le_bytes(block_hash.0[..8].try_into().expect("fixed slice length"));
        let k1 = u64::from_le_bytes(block_hash.0[8..16].try_into().expect("fixed slice length"));

        let digest = siphash24_bytes(k0, k1, &self.0);

        let mut out = [0u8; SHORT_ID_SIZE];
        out.copy_from_slice(&digest.to_le_bytes()[..SHORT_ID_SIZE]);
        ShortId(out)
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A 6-byte identifier for a kernel within a compact block.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortId(pub [u8; SHORT_ID_SIZE]);

impl ShortId {
    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; SHORT_ID_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for ShortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Display for ShortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_from_hex(s: &str) -> Hash {
        Hash(hex::decode(s).unwrap().try_into().unwrap())
    }

    #[test]
    fn short_id_known_answers() {
        let zero = Hash::ZERO;

        let h = hash_from_hex("81e47a19e6b29b0a65b9591762ce5143ed30d0261e5d24a3201752506b20f15c");
        assert_eq!(h.short_id(&zero).as_bytes(), &hex_id("e973960ba690"));

        let h = hash_from_hex("3a42e66e46dd7633b57d1f921780a1ac715e6b93c19ee52ab714178eb3a9f673");
        assert_eq!(h.short_id(&zero).as_bytes(), &hex_id("f0c06e838e59"));

        let other =
            hash_from_hex("81e47a19e6b29b0a65b9591762ce5143ed30d0261e5d24a3201752506b20f15c");
        assert_eq!(h.short_id(&other).as_bytes(), &hex_id("95bf0ca12d5b"));
    }

    fn hex_id(s: &str) -> [u8; SHORT_ID_SIZE] {
        hex::decode(s).unwrap().try_into().unwrap()
    }
}
