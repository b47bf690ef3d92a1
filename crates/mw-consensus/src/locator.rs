//! Block locators for header requests.

use crate::ser::Reader;
use crate::{ConsensusError, Hash, MAX_LOCATORS};
use bytes::{BufMut, Bytes, BytesMut};

/// An ordered list of recent block hashes. A peer answers with the headers
/// that follow the first hash it recognises.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Locator {
    /// Hashes from newest to oldest.
    pub hashes: Vec<Hash>,
}

impl Locator {
    /// Create a locator, truncating to the maximum length.
    pub fn new(mut hashes: Vec<Hash>) -> Self {
        hashes.truncate(MAX_LOCATORS);
        Self { hashes }
    }

    /// Serialize into `buf`.
    pub fn write(&self, buf: &mut BytesMut) {
        debug_assert!(self.hashes.len() <= MAX_LOCATORS);

        buf.put_u8(self.hashes.len() as u8);
        for hash in &self.hashes {
            buf.put_slice(hash.as_bytes());
        }
    }

    /// The serialized bytes.
    pub fn bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write(&mut buf);
        buf.freeze()
    }

    /// Deserialize from `r`, rejecting oversized locators.
    pub fn read(r: &mut Reader) -> Result<Self, ConsensusError> {
        let count = r.u8()?;
        if usize::from(count) > MAX_LOCATORS {
            return Err(ConsensusError::TooMany {
                collection: "locator hashes",
                count: u64::from(count),
                max: MAX_LOCATORS as u64,
            });
        }

        let mut hashes = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            hashes.push(Hash(r.fixed()?));
        }

        Ok(Self { hashes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let locator = Locator::new(vec![Hash::of(b"a"), Hash::of(b"b"), Hash::of(b"c")]);
        let mut r = Reader::new(locator.bytes());
        let decoded = Locator::read(&mut r).unwrap();
        r.expect_empty().unwrap();
        assert_eq!(decoded, locator);
    }

    #[test]
    fn constructor_truncates_to_maximum() {
        let locator = Locator::new(vec![Hash::ZERO; MAX_LOCATORS + 5]);
        assert_eq!(locator.hashes.len(), MAX_LOCATORS);
    }

    #[test]
    fn decode_rejects_oversized_locator() {
        let mut buf = BytesMut::new();
        buf.put_u8(MAX_LOCATORS as u8 + 1);
        for _ in 0..MAX_LOCATORS + 1 {
            buf.put_slice(&[0u8; 32]);
        }

        let mut r = Reader::new(buf.freeze());
        assert!(matches!(
            Locator::read(&mut r),
            Err(ConsensusError::TooMany { .. })
        ));
    }
}
