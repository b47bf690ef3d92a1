//! # mw-pow
//!
//! Cuckoo-cycle proof-of-work verification.
//!
//! This crate provides:
//! - SipHash-2-4 in the keyed nonce form used for edge generation, the
//!   64-hash block mode, and the RFC byte-message form
//! - The legacy Cuckoo verifier (easiness-bounded nonce space)
//! - The Cuckatoo and Cuckaroo variants with their key derivations
//!
//! A proof is a set of edge nonces that must form a single cycle visiting
//! every edge exactly once in the bipartite graph keyed by the block header.

mod cuckoo;
mod siphash;

pub use cuckoo::{find_cycle_length, Cuckaroo, Cuckatoo, Cuckoo, Edge};
pub use siphash::{siphash24, siphash24_bytes, siphash_block, SipHash24};
