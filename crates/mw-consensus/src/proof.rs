//! Cuckoo-cycle proof serialization.
//!
//! A proof is the graph size (edge bits) followed by the 42 cycle nonces
//! packed into a bit vector: nonce `i` occupies bits
//! `[i * edge_bits, (i + 1) * edge_bits)`, least-significant bit first
//! within each byte.

use crate::ser::Reader;
use crate::{ConsensusError, Difficulty, Hash, PROOF_SIZE};
use bytes::{BufMut, Bytes, BytesMut};

/// A Cuckoo-cycle proof of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    /// Power of two used for the size of the cuckoo graph.
    pub edge_bits: u8,
    /// The cycle nonces.
    pub nonces: Vec<u32>,
}

impl Proof {
    /// Create a proof from its parts.
    pub fn new(edge_bits: u8, nonces: Vec<u32>) -> Self {
        Self { edge_bits, nonces }
    }

    /// The packed nonce bit vector, without the leading edge-bits byte.
    ///
    /// This is the input to the block hash.
    pub fn pow_bytes(&self) -> Vec<u8> {
        let nonce_bits = usize::from(self.edge_bits);
        let bitvec_len_bits = nonce_bits * PROOF_SIZE;
        let mut bitvec = vec![0u8; (bitvec_len_bits + 7) / 8];

        for (n, &nonce) in self.nonces.iter().enumerate() {
            for bit in 0..nonce_bits {
                if bit < 32 && nonce & (1u32 << bit) != 0 {
                    let offset = n * nonce_bits + bit;
                    bitvec[offset / 8] |= 1 << (offset % 8);
                }
            }
        }

        bitvec
    }

    /// Serialize: edge bits, then the packed nonces.
    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_u8(self.edge_bits);
        buf.put_slice(&self.pow_bytes());
    }

    /// The full serialized proof.
    pub fn bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write(&mut buf);
        buf.freeze()
    }

    /// Deserialize a proof, rejecting graph sizes outside 1..=64.
    pub fn read(r: &mut Reader) -> Result<Self, ConsensusError> {
        let edge_bits = r.u8()?;
        if edge_bits == 0 || edge_bits > 64 {
            return Err(ConsensusError::InvalidEdgeBits(edge_bits));
        }

        let nonce_bits = usize::from(edge_bits);
        let bitvec_len_bits = nonce_bits * PROOF_SIZE;
        let bitvec = r.bytes((bitvec_len_bits + 7) / 8)?;

        let mut nonces = Vec::with_capacity(PROOF_SIZE);
        for n in 0..PROOF_SIZE {
            let mut nonce: u64 = 0;
            for bit in 0..nonce_bits {
                let offset = n * nonce_bits + bit;
                if bitvec[offset / 8] & (1 << (offset % 8)) != 0 {
                    nonce |= 1 << bit;
                }
            }
            let nonce = u32::try_from(nonce).map_err(|_| ConsensusError::InvalidPow)?;
            nonces.push(nonce);
        }

        Ok(Self { edge_bits, nonces })
    }

    /// BLAKE2b-256 of the serialized proof.
    pub fn hash(&self) -> Hash {
        Hash::of(&self.bytes())
    }

    /// The difficulty this proof achieves.
    pub fn to_difficulty(&self) -> Difficulty {
        Difficulty::from_hash(&self.hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascending_nonces(_edge_bits: u8) -> Vec<u32> {
        // Strictly ascending and below 2^8, so valid for every graph size.
        (1..=PROOF_SIZE as u32).map(|i| i * 3).collect()
    }

    #[test]
    fn packing_roundtrip_across_edge_sizes() {
        for edge_bits in [8u8, 19, 20, 29, 30, 31, 32] {
            let nonces = ascending_nonces(edge_bits);
            let proof = Proof::new(edge_bits, nonces.clone());

            let mut r = Reader::new(proof.bytes());
            let decoded = Proof::read(&mut r).unwrap();
            r.expect_empty().unwrap();

            assert_eq!(decoded.edge_bits, edge_bits);
            assert_eq!(decoded.nonces, nonces);
        }
    }

    #[test]
    fn packed_length_is_minimal() {
        let proof = Proof::new(30, vec![0u32; PROOF_SIZE]);
        // 42 nonces * 30 bits = 1260 bits = 158 bytes (rounded up).
        assert_eq!(proof.pow_bytes().len(), 158);
        assert_eq!(proof.bytes().len(), 159);
    }

    #[test]
    fn rejects_invalid_edge_bits() {
        let mut r = Reader::new(Bytes::from_static(&[0u8]));
        assert_eq!(
            Proof::read(&mut r),
            Err(ConsensusError::InvalidEdgeBits(0))
        );

        let mut r = Reader::new(Bytes::from_static(&[65u8]));
        assert_eq!(
            Proof::read(&mut r),
            Err(ConsensusError::InvalidEdgeBits(65))
        );
    }

    #[test]
    fn truncated_bitvec_is_an_error() {
        let proof = Proof::new(20, ascending_nonces(20));
        let bytes = proof.bytes();
        let mut r = Reader::new(bytes.slice(..bytes.len() - 1));
        assert_eq!(Proof::read(&mut r), Err(ConsensusError::UnexpectedEof));
    }
}
