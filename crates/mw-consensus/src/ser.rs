//! Checked wire deserialization.
//!
//! All multi-byte integers are big-endian on the wire. Writers build into a
//! `BytesMut`; readers consume a `Bytes` through [`Reader`], which fails
//! with `UnexpectedEof` instead of panicking on short input and can assert
//! that a body was consumed exactly.

use crate::ConsensusError;
use bytes::{Buf, Bytes};

/// Bounds-checked cursor over a message body.
pub struct Reader {
    buf: Bytes,
}

impl Reader {
    /// Wrap a body buffer.
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Bytes left to consume.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize) -> Result<(), ConsensusError> {
        if self.buf.remaining() < n {
            return Err(ConsensusError::UnexpectedEof);
        }
        Ok(())
    }

    /// Read a u8.
    pub fn u8(&mut self) -> Result<u8, ConsensusError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    /// Read a big-endian u16.
    pub fn u16(&mut self) -> Result<u16, ConsensusError> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    /// Read a big-endian u32.
    pub fn u32(&mut self) -> Result<u32, ConsensusError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    /// Read a big-endian u64.
    pub fn u64(&mut self) -> Result<u64, ConsensusError> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    /// Read a big-endian i64.
    pub fn i64(&mut self) -> Result<i64, ConsensusError> {
        self.need(8)?;
        Ok(self.buf.get_i64())
    }

    /// Read `n` raw bytes.
    pub fn bytes(&mut self, n: usize) -> Result<Bytes, ConsensusError> {
        self.need(n)?;
        Ok(self.buf.copy_to_bytes(n))
    }

    /// Read a fixed-size array.
    pub fn fixed<const N: usize>(&mut self) -> Result<[u8; N], ConsensusError> {
        self.need(N)?;
        let mut out = [0u8; N];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    /// Fail unless the body was consumed exactly.
    pub fn expect_empty(&self) -> Result<(), ConsensusError> {
        if self.buf.has_remaining() {
            return Err(ConsensusError::TrailingBytes(self.buf.remaining()));
        }
        Ok(())
    }
}
