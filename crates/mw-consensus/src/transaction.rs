//! Standalone transactions.

use crate::block::{is_sorted_by_hash, read_count, read_list, sorted_by_hash, Input, Output, TxKernel};
use crate::ser::Reader;
use crate::{ConsensusError, Hash};
use bytes::{BufMut, Bytes, BytesMut};
use mw_crypto::{excess_sums_match, Commitment, RangeProofVerifier};

/// A transaction: a kernel offset plus sorted inputs, outputs and kernels.
///
/// The offset is the part of the total blinding factor split away from the
/// kernel excess so that kernels cannot be linked back to their
/// transaction once aggregated into a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Blinding factor split off the kernel excess.
    pub kernel_offset: Hash,
    /// Spent outputs.
    pub inputs: Vec<Input>,
    /// Created outputs.
    pub outputs: Vec<Output>,
    /// Transaction kernels.
    pub kernels: Vec<TxKernel>,
}

impl Transaction {
    /// Serialize into `buf`, emitting the sequences in ascending hash
    /// order.
    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_slice(self.kernel_offset.as_bytes());

        buf.put_u64(self.inputs.len() as u64);
        buf.put_u64(self.outputs.len() as u64);
        buf.put_u64(self.kernels.len() as u64);

        for input in sorted_by_hash(&self.inputs, Input::hash) {
            input.write(buf);
        }
        for output in sorted_by_hash(&self.outputs, Output::hash) {
            output.write(buf);
        }
        for kernel in sorted_by_hash(&self.kernels, TxKernel::hash) {
            kernel.write(buf);
        }
    }

    /// The serialized bytes.
    pub fn bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write(&mut buf);
        buf.freeze()
    }

    /// Deserialize from `r`, enforcing count bounds and sort order.
    pub fn read(r: &mut Reader) -> Result<Self, ConsensusError> {
        let kernel_offset = Hash(r.fixed()?);

        let inputs = read_count(r, "inputs")?;
        let outputs = read_count(r, "outputs")?;
        let kernels = read_count(r, "kernels")?;

        let tx = Self {
            kernel_offset,
            inputs: read_list(r, inputs, Input::read)?,
            outputs: read_list(r, outputs, Output::read)?,
            kernels: read_list(r, kernels, TxKernel::read)?,
        };

        tx.verify_sorted()?;
        Ok(tx)
    }

    /// Hash of the serialized transaction, used for mempool identity.
    pub fn hash(&self) -> Hash {
        Hash::of(&self.bytes())
    }

    /// Sum of all kernel fees.
    pub fn total_fees(&self) -> u64 {
        self.kernels.iter().map(|k| k.fee).sum()
    }

    fn verify_sorted(&self) -> Result<(), ConsensusError> {
        if !is_sorted_by_hash(&self.inputs, Input::hash) {
            return Err(ConsensusError::Unsorted("transaction inputs"));
        }
        if !is_sorted_by_hash(&self.outputs, Output::hash) {
            return Err(ConsensusError::Unsorted("transaction outputs"));
        }
        if !is_sorted_by_hash(&self.kernels, TxKernel::hash) {
            return Err(ConsensusError::Unsorted("transaction kernels"));
        }
        Ok(())
    }

    /// Verify transaction-scope consensus rules: sort order, range proofs,
    /// kernel signatures and the commitment sums. A transaction destroys
    /// exactly its fees on H.
    pub fn validate(&self, verifier: &dyn RangeProofVerifier) -> Result<(), ConsensusError> {
        if self.kernels.is_empty() {
            return Err(ConsensusError::MissingKernel);
        }

        self.verify_sorted()?;

        for output in &self.outputs {
            if !verifier.verify(&output.commit, &output.proof) {
                return Err(ConsensusError::InvalidRangeProof);
            }
        }

        for kernel in &self.kernels {
            kernel.validate()?;
        }

        let inputs: Vec<Commitment> = self.inputs.iter().map(|i| i.commit).collect();
        let outputs: Vec<Commitment> = self.outputs.iter().map(|o| o.commit).collect();
        let excesses: Vec<Commitment> = self.kernels.iter().map(|k| k.excess).collect();

        let overage = -(self.total_fees() as i64);
        let balanced = excess_sums_match(
            &inputs,
            &outputs,
            &excesses,
            self.kernel_offset.as_bytes(),
            overage,
        )?;
        if !balanced {
            return Err(ConsensusError::KernelSumMismatch);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::Scalar;
    use mw_crypto::{commit, kernel_message, sign, RangeProof, Signature, StructuralVerifier};

    /// A one-in, two-out transaction whose sums balance: spend 100, create
    /// 90 and 8, fee 2, with a kernel offset of 3.
    fn balanced_tx() -> Transaction {
        let in_blind = Scalar::from(1000u64);
        let out1_blind = Scalar::from(400u64);
        let out2_blind = Scalar::from(550u64);
        let offset = Scalar::from(3u64);

        let excess_blind = out1_blind + out2_blind - in_blind - offset;
        let msg = kernel_message(2, 0);

        let mut kernel_offset = [0u8; 32];
        kernel_offset[31] = 3;

        Transaction {
            kernel_offset: Hash(kernel_offset),
            inputs: vec![Input {
                features: 0,
                commit: commit(100, &in_blind),
            }],
            outputs: sorted_by_hash(
                &[
                    Output {
                        features: 0,
                        commit: commit(90, &out1_blind),
                        proof: RangeProof::new(vec![1u8; 32]).unwrap(),
                    },
                    Output {
                        features: 0,
                        commit: commit(8, &out2_blind),
                        proof: RangeProof::new(vec![2u8; 32]).unwrap(),
                    },
                ],
                Output::hash,
            )
            .into_iter()
            .cloned()
            .collect(),
            kernels: vec![TxKernel {
                features: 0,
                fee: 2,
                lock_height: 0,
                excess: commit(0, &excess_blind),
                excess_sig: sign(&excess_blind, &msg),
            }],
        }
    }

    #[test]
    fn roundtrip_preserves_transaction() {
        let tx = balanced_tx();
        let mut r = Reader::new(tx.bytes());
        let decoded = Transaction::read(&mut r).unwrap();
        r.expect_empty().unwrap();
        assert_eq!(decoded.bytes(), tx.bytes());
        assert_eq!(decoded.hash(), tx.hash());
    }

    #[test]
    fn validates_balanced_transaction() {
        balanced_tx().validate(&StructuralVerifier).unwrap();
    }

    #[test]
    fn rejects_tampered_fee() {
        let mut tx = balanced_tx();
        tx.kernels[0].fee = 3;
        // The signature covers the fee, so it breaks first.
        assert_eq!(
            tx.validate(&StructuralVerifier),
            Err(ConsensusError::InvalidKernelSignature)
        );
    }

    #[test]
    fn rejects_inflated_output() {
        let mut tx = balanced_tx();
        tx.outputs[0].commit = commit(91, &Scalar::from(400u64));
        assert_eq!(
            tx.validate(&StructuralVerifier),
            Err(ConsensusError::KernelSumMismatch)
        );
    }

    #[test]
    fn rejects_kernelless_transaction() {
        let mut tx = balanced_tx();
        tx.kernels.clear();
        assert_eq!(
            tx.validate(&StructuralVerifier),
            Err(ConsensusError::MissingKernel)
        );
    }

    #[test]
    fn rejects_garbage_signature() {
        let mut tx = balanced_tx();
        tx.kernels[0].excess_sig = Signature::from_bytes([0u8; 64]);
        assert!(tx.validate(&StructuralVerifier).is_err());
    }

    #[test]
    fn decode_rejects_oversized_counts() {
        let mut buf = BytesMut::new();
        buf.put_slice(&[0u8; 32]);
        buf.put_u64(crate::MAX_TX_PARTS + 1);
        buf.put_u64(0);
        buf.put_u64(0);

        let mut r = Reader::new(buf.freeze());
        assert!(matches!(
            Transaction::read(&mut r),
            Err(ConsensusError::TooMany { .. })
        ));
    }
}
