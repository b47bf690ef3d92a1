//! The two-step connection handshake.
//!
//! The connecting side sends a `Hand` advertising its version and
//! characteristics; the accepting side answers with a `Shake`. The
//! accepting side also keeps a ring of its own recently emitted Hand
//! nonces so a connection back to itself is recognised and refused.

use crate::message::{read_addr, read_string, write_addr, write_string};
use bytes::BytesMut;
use mw_consensus::ser::Reader;
use mw_consensus::{Capabilities, ConsensusError, Difficulty};
use std::collections::VecDeque;
use std::net::SocketAddr;

/// Number of recent handshake nonces remembered for self-connection
/// detection.
pub const HANDSHAKE_NONCES: usize = 100;

/// First part of the handshake: the sender advertises its version and
/// characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hand {
    /// Protocol version of the sender.
    pub version: u32,
    /// Capabilities of the sender.
    pub capabilities: Capabilities,
    /// Randomly generated for each handshake, helps detect self.
    pub nonce: u64,
    /// Total difficulty accumulated by the sender.
    pub total_difficulty: Difficulty,
    /// Network address of the sender.
    pub sender_addr: SocketAddr,
    /// Network address of the receiver, as seen by the sender.
    pub receiver_addr: SocketAddr,
    /// Name and version of the sender's software.
    pub user_agent: String,
}

impl Hand {
    /// Serialize into `buf`.
    pub fn write(&self, buf: &mut BytesMut) {
        use bytes::BufMut;

        buf.put_u32(self.version);
        buf.put_u32(self.capabilities.0);
        buf.put_u64(self.nonce);
        buf.put_u64(self.total_difficulty.to_num());
        write_addr(buf, &self.sender_addr);
        write_addr(buf, &self.receiver_addr);
        write_string(buf, &self.user_agent);
    }

    /// Deserialize from `r`.
    pub fn read(r: &mut Reader) -> Result<Self, ConsensusError> {
        Ok(Self {
            version: r.u32()?,
            capabilities: Capabilities(r.u32()?),
            nonce: r.u64()?,
            total_difficulty: Difficulty::from_num(r.u64()?),
            sender_addr: read_addr(r)?,
            receiver_addr: read_addr(r)?,
            user_agent: read_string(r)?,
        })
    }
}

/// Second part of the handshake: the accepting side replies with its own
/// version and characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shake {
    /// Protocol version of the sender.
    pub version: u32,
    /// Capabilities of the sender.
    pub capabilities: Capabilities,
    /// Total difficulty accumulated by the sender.
    pub total_difficulty: Difficulty,
    /// Name and version of the sender's software.
    pub user_agent: String,
}

impl Shake {
    /// Serialize into `buf`.
    pub fn write(&self, buf: &mut BytesMut) {
        use bytes::BufMut;

        buf.put_u32(self.version);
        buf.put_u32(self.capabilities.0);
        buf.put_u64(self.total_difficulty.to_num());
        write_string(buf, &self.user_agent);
    }

    /// Deserialize from `r`.
    pub fn read(r: &mut Reader) -> Result<Self, ConsensusError> {
        Ok(Self {
            version: r.u32()?,
            capabilities: Capabilities(r.u32()?),
            total_difficulty: Difficulty::from_num(r.u64()?),
            user_agent: read_string(r)?,
        })
    }
}

/// Bounded ring of recently emitted handshake nonces.
#[derive(Debug)]
pub struct NonceRing {
    cap: usize,
    ring: VecDeque<u64>,
}

impl NonceRing {
    /// Create a ring remembering up to `cap` nonces.
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            ring: VecDeque::with_capacity(cap),
        }
    }

    /// Draw a fresh nonce and remember it.
    pub fn next_nonce(&mut self) -> u64 {
        let nonce = rand::random();
        if self.ring.len() == self.cap {
            self.ring.pop_front();
        }
        self.ring.push_back(nonce);
        nonce
    }

    /// Whether `nonce` is one of ours.
    pub fn contains(&self, nonce: u64) -> bool {
        self.ring.contains(&nonce)
    }
}

impl Default for NonceRing {
    fn default() -> Self {
        Self::new(HANDSHAKE_NONCES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hand_roundtrip() {
        let hand = Hand {
            version: 1,
            capabilities: Capabilities::FULL_NODE,
            nonce: 0xfeed_beef,
            total_difficulty: Difficulty::from_num(12),
            sender_addr: "127.0.0.1:13414".parse().unwrap(),
            receiver_addr: "[2001:db8::7]:13414".parse().unwrap(),
            user_agent: "mw-node 0.1.0".to_string(),
        };

        let mut buf = BytesMut::new();
        hand.write(&mut buf);

        let mut r = Reader::new(buf.freeze());
        let decoded = Hand::read(&mut r).unwrap();
        r.expect_empty().unwrap();
        assert_eq!(decoded, hand);
    }

    #[test]
    fn shake_roundtrip() {
        let shake = Shake {
            version: 1,
            capabilities: Capabilities::FAST_SYNC_NODE,
            total_difficulty: Difficulty::from_num(30000),
            user_agent: "MW/Grin 0.3.0".to_string(),
        };

        let mut buf = BytesMut::new();
        shake.write(&mut buf);

        let mut r = Reader::new(buf.freeze());
        let decoded = Shake::read(&mut r).unwrap();
        r.expect_empty().unwrap();
        assert_eq!(decoded, shake);
    }

    #[test]
    fn nonce_ring_remembers_recent_nonces() {
        let mut ring = NonceRing::new(3);
        let a = ring.next_nonce();
        let b = ring.next_nonce();
        assert!(ring.contains(a));
        assert!(ring.contains(b));

        // Overflow the capacity; the oldest nonce is forgotten.
        ring.next_nonce();
        ring.next_nonce();
        assert!(!ring.contains(a));
        assert!(ring.contains(b));
    }
}
