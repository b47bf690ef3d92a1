//! Output range proofs.
//!
//! A range proof shows that the committed value lies in the valid range
//! without revealing it. Proof verification is delegated through the
//! [`RangeProofVerifier`] seam so a deployment can plug in its bulletproof
//! backend; the structural verifier enforces the wire-level rules only.

use crate::commit::Commitment;
use crate::CryptoError;

/// Maximum serialized size of a range proof.
pub const MAX_PROOF_SIZE: usize = 5134;

/// An opaque serialized range proof.
#[derive(Clone, PartialEq, Eq)]
pub struct RangeProof {
    bytes: Vec<u8>,
}

impl RangeProof {
    /// Wrap proof bytes, enforcing the size bound.
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.is_empty() || bytes.len() > MAX_PROOF_SIZE {
            return Err(CryptoError::InvalidProofLength(bytes.len()));
        }
        Ok(Self { bytes })
    }

    /// The serialized proof bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Serialized length.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the proof is empty (never true for a constructed proof).
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for RangeProof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RangeProof({} bytes)", self.bytes.len())
    }
}

/// Verification backend for range proofs.
pub trait RangeProofVerifier: Send + Sync {
    /// Verify `proof` against the commitment it ranges over.
    fn verify(&self, commit: &Commitment, proof: &RangeProof) -> bool;
}

/// Structural verifier: accepts any proof that satisfies the wire-level
/// size rules and whose commitment decodes to a curve point.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralVerifier;

impl RangeProofVerifier for StructuralVerifier {
    fn verify(&self, commit: &Commitment, proof: &RangeProof) -> bool {
        !proof.is_empty() && proof.len() <= MAX_PROOF_SIZE && commit.to_point().is_ok()
    }
}
