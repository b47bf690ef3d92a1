//! Cuckoo-cycle verification.
//!
//! A proof is a list of edge nonces in strictly ascending order. Each nonce
//! selects one edge of a bipartite graph whose endpoints are derived from a
//! SipHash key; even vertices form the U partition, odd vertices the V
//! partition. The proof is valid iff the edges form a single cycle visiting
//! every edge exactly once.
//!
//! Three keying variants exist: the legacy easiness-bounded Cuckoo, Cuckatoo
//! (keys taken as the raw little-endian words of a BLAKE2b-256 header hash)
//! and Cuckaroo (raw keys, edges drawn from the SipHash block mode).

use crate::siphash::{siphash24, siphash_block};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

/// One graph edge with per-partition visit marks used by the cycle walk.
#[derive(Debug, Clone, Copy, Default)]
pub struct Edge {
    /// U-partition endpoint (even vertex).
    pub u: u64,
    /// V-partition endpoint (odd vertex).
    pub v: u64,
    used_u: bool,
    used_v: bool,
}

impl Edge {
    /// Create an edge between `u` and `v`.
    pub fn new(u: u64, v: u64) -> Self {
        Self {
            u,
            v,
            used_u: false,
            used_v: false,
        }
    }
}

/// Walk the edge set alternating partitions and return the cycle length.
///
/// Starting from the first edge, repeatedly find another edge sharing the
/// current endpoint, marking both ends used. Returns the number of hops
/// taken; a proof is sound iff this equals the number of edges, which means
/// the walk consumed every edge and closed back on the start.
pub fn find_cycle_length(edges: &mut [Edge]) -> usize {
    let n = edges.len();
    if n == 0 {
        return 0;
    }

    let mut i = 0;
    let mut on_u = true;
    let mut cycle = 0;

    'walk: loop {
        if on_u {
            for j in 0..n {
                if j != i && !edges[j].used_u && edges[i].u == edges[j].u {
                    edges[i].used_u = true;
                    edges[j].used_u = true;

                    i = j;
                    on_u = false;
                    cycle += 1;
                    continue 'walk;
                }
            }
        } else {
            for j in 0..n {
                if j != i && !edges[j].used_v && edges[i].v == edges[j].v {
                    edges[i].used_v = true;
                    edges[j].used_v = true;

                    i = j;
                    on_u = true;
                    cycle += 1;
                    continue 'walk;
                }
            }
        }

        break;
    }

    cycle
}

fn header_keys(data: &[u8]) -> [u64; 4] {
    let hash = Blake2b::<U32>::digest(data);
    let word = |i: usize| u64::from_le_bytes(hash[i * 8..(i + 1) * 8].try_into().unwrap());
    [word(0), word(1), word(2), word(3)]
}

/// Legacy Cuckoo verifier over a graph of `2^size_shift` vertices.
///
/// The key bytes are hashed with BLAKE2b-256 and the first two little-endian
/// words are expanded into SipHash state via the standard constants. Nonces
/// must lie within the easiness fraction of the graph size.
pub struct Cuckoo {
    keys: [u64; 4],
    size: u64,
    mask: u64,
}

impl Cuckoo {
    /// Create a verifier for `key` and graph size `2^size_shift`.
    pub fn new(key: &[u8], size_shift: u32) -> Self {
        let hash = Blake2b::<U32>::digest(key);
        let k0 = u64::from_le_bytes(hash[..8].try_into().unwrap());
        let k1 = u64::from_le_bytes(hash[8..16].try_into().unwrap());

        let size = 1u64 << size_shift;
        Self {
            keys: [
                k0 ^ 0x736f6d6570736575,
                k1 ^ 0x646f72616e646f6d,
                k0 ^ 0x6c7967656e657261,
                k1 ^ 0x7465646279746573,
            ],
            size,
            mask: size / 2 - 1,
        }
    }

    fn node(&self, nonce: u64, parity: u64) -> u64 {
        ((siphash24(self.keys, 2 * nonce + parity) & self.mask) << 1) | parity
    }

    /// Build the edge selected by `nonce`.
    pub fn edge(&self, nonce: u32) -> Edge {
        Edge::new(self.node(nonce as u64, 0), self.node(nonce as u64, 1))
    }

    /// Verify that `nonces` form a full cycle. Each nonce must be strictly
    /// greater than its predecessor and below `ease * size / 100`.
    pub fn verify(&self, nonces: &[u32], ease: u64) -> bool {
        if nonces.is_empty() {
            return false;
        }

        let easiness = ease * self.size / 100;

        let mut edges = Vec::with_capacity(nonces.len());
        for (i, &nonce) in nonces.iter().enumerate() {
            if u64::from(nonce) >= easiness || (i != 0 && nonce <= nonces[i - 1]) {
                return false;
            }
            edges.push(self.edge(nonce));
        }

        find_cycle_length(&mut edges) == nonces.len()
    }
}

/// Cuckatoo verifier: keys are the four raw little-endian words of the
/// BLAKE2b-256 header hash, nonces are bounded by the edge count.
pub struct Cuckatoo {
    keys: [u64; 4],
    edge_bits: u8,
    mask: u64,
}

impl Cuckatoo {
    /// Create a verifier keyed by `header` for a graph with `2^edge_bits`
    /// edges.
    pub fn new(header: &[u8], edge_bits: u8) -> Self {
        Self {
            keys: header_keys(header),
            edge_bits,
            mask: (1u64 << edge_bits) - 1,
        }
    }

    /// The derived SipHash key words.
    pub fn keys(&self) -> [u64; 4] {
        self.keys
    }

    /// Verify that `nonces` form a full cycle.
    pub fn verify(&self, nonces: &[u32]) -> bool {
        if nonces.is_empty() {
            return false;
        }

        let num_edges = 1u64 << self.edge_bits;

        let mut edges = Vec::with_capacity(nonces.len());
        for (i, &nonce) in nonces.iter().enumerate() {
            if u64::from(nonce) >= num_edges || (i != 0 && nonce <= nonces[i - 1]) {
                return false;
            }
            let n = u64::from(nonce);
            edges.push(Edge::new(
                (siphash24(self.keys, 2 * n) & self.mask) << 1,
                ((siphash24(self.keys, 2 * n + 1) & self.mask) << 1) | 1,
            ));
        }

        find_cycle_length(&mut edges) == nonces.len()
    }
}

/// Cuckaroo verifier: four raw key words supplied directly, both endpoints
/// of an edge drawn from a single block-mode hash.
pub struct Cuckaroo {
    keys: [u64; 4],
}

impl Cuckaroo {
    /// Create a verifier from raw SipHash key words.
    pub fn from_keys(keys: [u64; 4]) -> Self {
        Self { keys }
    }

    /// Create a verifier keyed by a serialized header.
    pub fn new(header: &[u8]) -> Self {
        Self {
            keys: header_keys(header),
        }
    }

    /// Verify that `nonces` form a full cycle in a graph with `2^edge_bits`
    /// edges.
    pub fn verify(&self, nonces: &[u32], edge_bits: u8) -> bool {
        if nonces.is_empty() {
            return false;
        }

        let num_edges = 1u64 << edge_bits;
        let mask = num_edges - 1;

        let mut edges = Vec::with_capacity(nonces.len());
        for (i, &nonce) in nonces.iter().enumerate() {
            if u64::from(nonce) >= num_edges || (i != 0 && nonce <= nonces[i - 1]) {
                return false;
            }
            let e = siphash_block(self.keys, u64::from(nonce));
            edges.push(Edge::new((e & mask) << 1, (((e >> 32) & mask) << 1) | 1));
        }

        find_cycle_length(&mut edges) == nonces.len()
    }
}
