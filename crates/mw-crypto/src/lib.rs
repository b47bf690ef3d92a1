//! # mw-crypto
//!
//! Commitment and signature primitives for transaction kernels.
//!
//! This crate provides:
//! - Pedersen commitments `blind * G + value * H` over secp256k1
//! - Schnorr signatures in the (R.x, s) wire form used by kernel excesses
//! - The 32-byte kernel signing message (fee, lock height)
//! - A verification seam for output range proofs

mod commit;
mod error;
mod rangeproof;
mod schnorr;

pub use commit::{commit, excess_sums_match, offset_delta, Commitment, PEDERSEN_COMMITMENT_SIZE};
pub use error::CryptoError;
pub use rangeproof::{RangeProof, RangeProofVerifier, StructuralVerifier, MAX_PROOF_SIZE};
pub use schnorr::{kernel_message, sign, verify, verify_excess, Signature, SIGNATURE_SIZE};
