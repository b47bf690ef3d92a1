//! Pedersen commitments.
//!
//! A commitment to value `v` with blinding factor `γ` is the curve point
//! `γ·G + v·H`, where H is the secondary generator with no known discrete
//! log relation to G. Commitments travel as 33 bytes: a parity tag (0x08
//! even y, 0x09 odd y) followed by the x coordinate.

use crate::CryptoError;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::point::DecompressPoint;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::subtle::Choice;
use k256::{AffinePoint, ProjectivePoint, Scalar, U256};
use std::sync::OnceLock;

/// Serialized size of a Pedersen commitment.
pub const PEDERSEN_COMMITMENT_SIZE: usize = 33;

/// X coordinate of the standard secp256k1 value generator H.
const GENERATOR_H_X: [u8; 32] = [
    0x50, 0x92, 0x9b, 0x74, 0xc1, 0xa0, 0x49, 0x54, 0xb7, 0x8b, 0x4b, 0x60, 0x35, 0xe9, 0x7a,
    0x5e, 0x07, 0x8a, 0x5a, 0x0f, 0x28, 0xec, 0x96, 0xd5, 0x47, 0xbf, 0xee, 0x9a, 0xce, 0x80,
    0x3a, 0xc0,
];

/// The value generator H (y is even).
fn generator_h() -> &'static ProjectivePoint {
    static H: OnceLock<ProjectivePoint> = OnceLock::new();
    H.get_or_init(|| {
        let affine = AffinePoint::decompress(&GENERATOR_H_X.into(), Choice::from(0));
        ProjectivePoint::from(Option::<AffinePoint>::from(affine).expect("H is on the curve"))
    })
}

/// A 33-byte Pedersen commitment. Commitments compare bytewise.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Commitment(pub [u8; PEDERSEN_COMMITMENT_SIZE]);

impl Commitment {
    /// Wrap raw commitment bytes without validating the point.
    pub fn from_bytes(bytes: [u8; PEDERSEN_COMMITMENT_SIZE]) -> Self {
        Self(bytes)
    }

    /// The serialized bytes.
    pub fn as_bytes(&self) -> &[u8; PEDERSEN_COMMITMENT_SIZE] {
        &self.0
    }

    /// Decode to a curve point. Accepts both the commitment tags (0x08/0x09)
    /// and the SEC1 compressed tags (0x02/0x03).
    pub fn to_point(&self) -> Result<ProjectivePoint, CryptoError> {
        let odd = match self.0[0] {
            0x02 | 0x08 => 0u8,
            0x03 | 0x09 => 1u8,
            _ => return Err(CryptoError::InvalidCommitment),
        };

        let x: [u8; 32] = self.0[1..].try_into().expect("fixed slice length");
        let affine = AffinePoint::decompress(&x.into(), Choice::from(odd));
        Option::<AffinePoint>::from(affine)
            .map(ProjectivePoint::from)
            .ok_or(CryptoError::InvalidCommitment)
    }

    /// Encode a curve point with the commitment parity tags.
    pub fn from_point(point: &ProjectivePoint) -> Self {
        let encoded = point.to_affine().to_encoded_point(true);
        let mut bytes = [0u8; PEDERSEN_COMMITMENT_SIZE];
        bytes.copy_from_slice(encoded.as_bytes());
        bytes[0] = if bytes[0] == 0x03 { 0x09 } else { 0x08 };
        Self(bytes)
    }

    /// Re-encode as a SEC1 compressed public key (0x02/0x03 tag), the form
    /// hashed into Schnorr challenges.
    pub fn to_compressed_pubkey(&self) -> Result<[u8; PEDERSEN_COMMITMENT_SIZE], CryptoError> {
        let encoded = self.to_point()?.to_affine().to_encoded_point(true);
        let mut bytes = [0u8; PEDERSEN_COMMITMENT_SIZE];
        bytes.copy_from_slice(encoded.as_bytes());
        Ok(bytes)
    }
}

impl std::fmt::Debug for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Commit to `value` with blinding factor `blind`.
pub fn commit(value: u64, blind: &Scalar) -> Commitment {
    let point = ProjectivePoint::GENERATOR * blind + generator_h() * &Scalar::from(value);
    Commitment::from_point(&point)
}

/// The kernel offset contributed by a single block: the difference, as
/// scalars, between its accumulated offset and its parent's.
pub fn offset_delta(total: &[u8; 32], prev_total: &[u8; 32]) -> [u8; 32] {
    let total = <Scalar as Reduce<U256>>::reduce_bytes(&(*total).into());
    let prev = <Scalar as Reduce<U256>>::reduce_bytes(&(*prev_total).into());
    (total - prev).to_bytes().into()
}

/// Check kernel sum consistency for a set of transaction commitments.
///
/// The sum of output commitments minus input commitments, with the kernel
/// offset (a blinding factor on G) and the overage (on H) removed, must
/// equal the sum of the kernel excess commitments. The overage is the net
/// value the object creates: the full reward for a block, minus the fees
/// for a standalone transaction.
pub fn excess_sums_match(
    inputs: &[Commitment],
    outputs: &[Commitment],
    excesses: &[Commitment],
    offset: &[u8; 32],
    overage: i64,
) -> Result<bool, CryptoError> {
    let mut lhs = ProjectivePoint::IDENTITY;
    for output in outputs {
        lhs += output.to_point()?;
    }
    for input in inputs {
        lhs -= input.to_point()?;
    }

    let offset_scalar = <Scalar as Reduce<U256>>::reduce_bytes(&(*offset).into());
    lhs -= ProjectivePoint::GENERATOR * offset_scalar;

    if overage >= 0 {
        lhs -= generator_h() * &Scalar::from(overage as u64);
    } else {
        lhs += generator_h() * &Scalar::from(overage.unsigned_abs());
    }

    let mut rhs = ProjectivePoint::IDENTITY;
    for excess in excesses {
        rhs += excess.to_point()?;
    }

    Ok(lhs == rhs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_point_roundtrip() {
        let c = commit(1000, &Scalar::from(12345u64));
        let point = c.to_point().unwrap();
        assert_eq!(Commitment::from_point(&point), c);
    }

    #[test]
    fn commitments_are_binding_to_value() {
        let blind = Scalar::from(7u64);
        assert_ne!(commit(1, &blind), commit(2, &blind));
        assert_ne!(commit(1, &blind), commit(1, &Scalar::from(8u64)));
    }

    #[test]
    fn rejects_bad_tag() {
        let mut bytes = *commit(5, &Scalar::from(5u64)).as_bytes();
        bytes[0] = 0x04;
        assert_eq!(
            Commitment::from_bytes(bytes).to_point(),
            Err(CryptoError::InvalidCommitment)
        );
    }

    #[test]
    fn excess_sum_balances_simple_transaction() {
        // Spend 60 into 40 + 18, fee 2: the transaction destroys its fee,
        // so the overage is -2. Blinding factors sum through the kernel
        // excess: excess = out_blinds - in_blinds - offset.
        let in_blind = Scalar::from(100u64);
        let out1_blind = Scalar::from(40u64);
        let out2_blind = Scalar::from(55u64);
        let offset = Scalar::from(3u64);

        // excess blind = (40 + 55) - 100 - 3 = -8
        let excess_blind = out1_blind + out2_blind - in_blind - offset;
        let excess = commit(0, &excess_blind);

        let inputs = [commit(60, &in_blind)];
        let outputs = [commit(40, &out1_blind), commit(18, &out2_blind)];

        let mut offset_bytes = [0u8; 32];
        offset_bytes[31] = 3;

        assert!(excess_sums_match(&inputs, &outputs, &[excess], &offset_bytes, -2).unwrap());
        // Wrong overage breaks the balance.
        assert!(!excess_sums_match(&inputs, &outputs, &[excess], &offset_bytes, 2).unwrap());
    }
}
