//! Schnorr signatures over secp256k1.
//!
//! The wire form is (R.x, s), 64 bytes. The challenge is
//! `e = SHA-256(R.x || compressed(P) || msg)` and verification checks
//! `s·G == R + e·P`. Only the x coordinate of R travels, so the check is
//! performed as `(s·G − e·P).x == R.x`, which is parity-agnostic.

use crate::commit::Commitment;
use crate::CryptoError;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar, U256};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Serialized signature size.
pub const SIGNATURE_SIZE: usize = 64;

/// A 64-byte (R.x, s) signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_SIZE]);

impl Signature {
    /// Wrap raw signature bytes.
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// The serialized bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// The 32-byte kernel signing message: 16 zero bytes, the fee and the lock
/// height as big-endian u64s.
pub fn kernel_message(fee: u64, lock_height: u64) -> [u8; 32] {
    let mut msg = [0u8; 32];
    msg[16..24].copy_from_slice(&fee.to_be_bytes());
    msg[24..32].copy_from_slice(&lock_height.to_be_bytes());
    msg
}

fn challenge(r_x: &[u8; 32], pubkey: &ProjectivePoint, msg: &[u8; 32]) -> Scalar {
    let compressed = pubkey.to_affine().to_encoded_point(true);

    let mut hasher = Sha256::new();
    hasher.update(r_x);
    hasher.update(compressed.as_bytes());
    hasher.update(msg);
    let digest: [u8; 32] = hasher.finalize().into();

    <Scalar as Reduce<U256>>::reduce_bytes(&digest.into())
}

fn x_bytes(point: &ProjectivePoint) -> [u8; 32] {
    let encoded = point.to_affine().to_encoded_point(true);
    encoded.as_bytes()[1..].try_into().expect("32-byte x coordinate")
}

/// Sign `msg` with the private key `secret`.
///
/// The prover commits to a random `R = k·G`, derives the challenge from R.x
/// and the public key, and returns `s = k + e·x`.
pub fn sign(secret: &Scalar, msg: &[u8; 32]) -> Signature {
    let pubkey = ProjectivePoint::GENERATOR * secret;

    let k = Scalar::random(&mut OsRng);
    let r = ProjectivePoint::GENERATOR * k;
    let r_x = x_bytes(&r);

    let e = challenge(&r_x, &pubkey, msg);
    let s = k + e * secret;

    let mut bytes = [0u8; SIGNATURE_SIZE];
    bytes[..32].copy_from_slice(&r_x);
    bytes[32..].copy_from_slice(&s.to_bytes());
    Signature(bytes)
}

/// Verify that `sig` signs `msg` under `pubkey`.
pub fn verify(pubkey: &ProjectivePoint, msg: &[u8; 32], sig: &Signature) -> bool {
    let r_x: [u8; 32] = sig.0[..32].try_into().expect("fixed slice length");
    let s_bytes: [u8; 32] = sig.0[32..].try_into().expect("fixed slice length");
    let s = <Scalar as Reduce<U256>>::reduce_bytes(&s_bytes.into());

    let e = challenge(&r_x, pubkey, msg);

    // R' = s·G − e·P must reproduce the committed x coordinate.
    let r = ProjectivePoint::GENERATOR * s - pubkey * &e;
    if r == ProjectivePoint::IDENTITY {
        return false;
    }

    x_bytes(&r) == r_x
}

/// Verify a kernel excess signature, with the excess commitment standing in
/// for the public key.
pub fn verify_excess(
    excess: &Commitment,
    msg: &[u8; 32],
    sig: &Signature,
) -> Result<bool, CryptoError> {
    let pubkey = excess.to_point()?;
    Ok(verify(&pubkey, msg, sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let secret = Scalar::from(8u64);
        let pubkey = ProjectivePoint::GENERATOR * secret;
        let msg = [0u8; 32];

        let sig = sign(&secret, &msg);
        assert!(verify(&pubkey, &msg, &sig));
    }

    #[test]
    fn bit_flips_break_verification() {
        let secret = Scalar::from(0xdead_beefu64);
        let pubkey = ProjectivePoint::GENERATOR * secret;
        let msg = kernel_message(7, 11);

        let sig = sign(&secret, &msg);
        assert!(verify(&pubkey, &msg, &sig));

        for bit in [0usize, 77, 200, 511] {
            let mut tampered = *sig.as_bytes();
            tampered[bit / 8] ^= 1 << (bit % 8);
            assert!(!verify(&pubkey, &msg, &Signature::from_bytes(tampered)));
        }

        for bit in [0usize, 100, 255] {
            let mut tampered = msg;
            tampered[bit / 8] ^= 1 << (bit % 8);
            assert!(!verify(&pubkey, &tampered, &sig));
        }
    }

    #[test]
    fn kernel_excess_vector() {
        let excess_bytes: [u8; 33] =
            hex::decode("092095ceab2c20f9a6109a7b0add8d488b3838dcc007c77a43cbe99a14a81b62e8")
                .unwrap()
                .try_into()
                .unwrap();
        let sig_bytes: [u8; 64] = hex::decode(
            "804b2ed798221e8f4c139daeedeab487221be33db1adf9e129928564e1702b02\
             fbbacaf4cbe4c4b122a9b39d2a7625b9254e43eeade171e9ccafda6dd8538acc",
        )
        .unwrap()
        .try_into()
        .unwrap();

        let excess = Commitment::from_bytes(excess_bytes);
        let msg = kernel_message(2, 0);
        let sig = Signature::from_bytes(sig_bytes);

        assert!(verify_excess(&excess, &msg, &sig).unwrap());

        // Any other fee fails.
        assert!(!verify_excess(&excess, &kernel_message(3, 0), &sig).unwrap());
    }

    #[test]
    fn kernel_message_layout() {
        let msg = kernel_message(2, 0);
        assert_eq!(&msg[..16], &[0u8; 16]);
        assert_eq!(&msg[16..24], &2u64.to_be_bytes());
        assert_eq!(&msg[24..], &0u64.to_be_bytes());
    }
}
