//! Blocks, headers and their consensus rules.
//!
//! Everything is sorted in lexicographical order of its hash on the wire:
//! encoding sorts, decoding rejects unsorted sequences.

use crate::ser::Reader;
use crate::{
    valid_version, ConsensusError, Difficulty, Hash, Proof, ShortId, BLOCK_INPUT_WEIGHT,
    BLOCK_KERNEL_WEIGHT, BLOCK_OUTPUT_WEIGHT, BLOCK_TIME_SEC, DEFAULT_MIN_EDGE_BITS,
    MAX_BLOCK_COINBASE_KERNELS, MAX_BLOCK_COINBASE_OUTPUTS, MAX_BLOCK_WEIGHT, MAX_TX_PARTS,
    PROOF_SIZE, REWARD, SECOND_POW_EDGE_BITS,
};
use bytes::{BufMut, Bytes, BytesMut};
use mw_crypto::{
    excess_sums_match, kernel_message, verify_excess, Commitment, RangeProof, RangeProofVerifier,
    Signature, MAX_PROOF_SIZE, PEDERSEN_COMMITMENT_SIZE, SIGNATURE_SIZE,
};
use mw_pow::Cuckaroo;

/// Output is a coinbase output, must not be spent until maturity.
pub const COINBASE_OUTPUT: u8 = 1;

/// Kernel matching a coinbase output.
pub const COINBASE_KERNEL: u8 = 1;

/// A transaction input: a reference to the output commitment being spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    /// Feature flags of the spent output.
    pub features: u8,
    /// The spent commitment.
    pub commit: Commitment,
}

impl Input {
    /// Serialize into `buf`.
    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_u8(self.features);
        buf.put_slice(self.commit.as_bytes());
    }

    /// The serialized bytes.
    pub fn bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + PEDERSEN_COMMITMENT_SIZE);
        self.write(&mut buf);
        buf.freeze()
    }

    /// Deserialize from `r`.
    pub fn read(r: &mut Reader) -> Result<Self, ConsensusError> {
        Ok(Self {
            features: r.u8()?,
            commit: Commitment::from_bytes(r.fixed()?),
        })
    }

    /// Hash of the serialized input, used for ordering.
    pub fn hash(&self) -> Hash {
        Hash::of(&self.bytes())
    }
}

/// A transaction output: a commitment to a value plus the proof that the
/// value is in range. The ordering hash covers features and commitment
/// only; the range proof is committed to separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// Feature flags.
    pub features: u8,
    /// The homomorphic commitment to the output amount.
    pub commit: Commitment,
    /// Proof that the committed amount is in range.
    pub proof: RangeProof,
}

impl Output {
    fn write_without_proof(&self, buf: &mut BytesMut) {
        buf.put_u8(self.features);
        buf.put_slice(self.commit.as_bytes());
    }

    /// Serialize into `buf`.
    pub fn write(&self, buf: &mut BytesMut) {
        self.write_without_proof(buf);
        buf.put_u64(self.proof.len() as u64);
        buf.put_slice(self.proof.as_bytes());
    }

    /// The serialized bytes.
    pub fn bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write(&mut buf);
        buf.freeze()
    }

    /// Deserialize from `r`, enforcing the range proof size bound.
    pub fn read(r: &mut Reader) -> Result<Self, ConsensusError> {
        let features = r.u8()?;
        let commit = Commitment::from_bytes(r.fixed()?);

        let proof_len = r.u64()?;
        if proof_len > MAX_PROOF_SIZE as u64 {
            return Err(ConsensusError::TooMany {
                collection: "range proof bytes",
                count: proof_len,
                max: MAX_PROOF_SIZE as u64,
            });
        }
        let proof = RangeProof::new(r.bytes(proof_len as usize)?.to_vec())?;

        Ok(Self {
            features,
            commit,
            proof,
        })
    }

    /// Hash over features and commitment, used for ordering.
    pub fn hash(&self) -> Hash {
        let mut buf = BytesMut::with_capacity(1 + PEDERSEN_COMMITMENT_SIZE);
        self.write_without_proof(&mut buf);
        Hash::of(&buf)
    }

    /// Whether this is a coinbase output.
    pub fn is_coinbase(&self) -> bool {
        self.features & COINBASE_OUTPUT == COINBASE_OUTPUT
    }
}

/// A transaction kernel: the proof that a transaction sums to zero. The
/// excess is the remainder of the commitment sum and the signature proves
/// it is a valid public key signing the fee and lock height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxKernel {
    /// Feature flags.
    pub features: u8,
    /// Fee originally included in the transaction.
    pub fee: u64,
    /// The kernel is not valid before this height.
    pub lock_height: u64,
    /// Remainder of the sum of all transaction commitments.
    pub excess: Commitment,
    /// Signature over (fee, lock height) by the excess key.
    pub excess_sig: Signature,
}

impl TxKernel {
    /// Serialize into `buf`.
    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_u8(self.features);
        buf.put_u64(self.fee);
        buf.put_u64(self.lock_height);
        buf.put_slice(self.excess.as_bytes());
        buf.put_slice(self.excess_sig.as_bytes());
    }

    /// The serialized bytes.
    pub fn bytes(&self) -> Bytes {
        let mut buf =
            BytesMut::with_capacity(17 + PEDERSEN_COMMITMENT_SIZE + SIGNATURE_SIZE);
        self.write(&mut buf);
        buf.freeze()
    }

    /// Deserialize from `r`.
    pub fn read(r: &mut Reader) -> Result<Self, ConsensusError> {
        Ok(Self {
            features: r.u8()?,
            fee: r.u64()?,
            lock_height: r.u64()?,
            excess: Commitment::from_bytes(r.fixed()?),
            excess_sig: Signature::from_bytes(r.fixed()?),
        })
    }

    /// Hash of the serialized kernel, used for ordering.
    pub fn hash(&self) -> Hash {
        Hash::of(&self.bytes())
    }

    /// Whether this is a coinbase kernel.
    pub fn is_coinbase(&self) -> bool {
        self.features & COINBASE_KERNEL == COINBASE_KERNEL
    }

    /// Verify the excess signature over the kernel message.
    pub fn validate(&self) -> Result<(), ConsensusError> {
        let msg = kernel_message(self.fee, self.lock_height);
        if !verify_excess(&self.excess, &msg, &self.excess_sig)? {
            return Err(ConsensusError::InvalidKernelSignature);
        }
        Ok(())
    }
}

/// A block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Version of the block.
    pub version: u16,
    /// Height of this block since the genesis block.
    pub height: u64,
    /// Timestamp at which the block was built, seconds since the epoch.
    pub timestamp: i64,
    /// Hash of the previous block in the chain.
    pub previous: Hash,
    /// Root of the previous header MMR.
    pub previous_root: Hash,
    /// Merklish root of all commitments in the output set.
    pub output_root: Hash,
    /// Merklish root of all range proofs in the output set.
    pub range_proof_root: Hash,
    /// Merklish root of all transaction kernels.
    pub kernel_root: Hash,
    /// Total accumulated sum of kernel offsets since genesis.
    pub total_kernel_offset: Hash,
    /// Size of the output MMR after applying this block.
    pub output_mmr_size: u64,
    /// Size of the kernel MMR after applying this block.
    pub kernel_mmr_size: u64,
    /// Total accumulated difficulty since genesis.
    pub total_difficulty: Difficulty,
    /// Difficulty scaling factor between proof-of-work classes.
    pub scaling_difficulty: u32,
    /// Nonce incremented while mining.
    pub nonce: u64,
    /// Proof of work.
    pub pow: Proof,
}

impl BlockHeader {
    /// Serialize the fields that precede the proof of work. This is the
    /// keying material for the cuckoo graph.
    pub fn pre_pow_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write_pre_pow(&mut buf);
        buf.freeze()
    }

    fn write_pre_pow(&self, buf: &mut BytesMut) {
        buf.put_u16(self.version);
        buf.put_u64(self.height);
        buf.put_i64(self.timestamp);
        buf.put_slice(self.previous.as_bytes());
        buf.put_slice(self.previous_root.as_bytes());
        buf.put_slice(self.output_root.as_bytes());
        buf.put_slice(self.range_proof_root.as_bytes());
        buf.put_slice(self.kernel_root.as_bytes());
        buf.put_slice(self.total_kernel_offset.as_bytes());
        buf.put_u64(self.output_mmr_size);
        buf.put_u64(self.kernel_mmr_size);
        buf.put_u64(self.total_difficulty.to_num());
        buf.put_u32(self.scaling_difficulty);
        buf.put_u64(self.nonce);
    }

    /// Serialize into `buf`.
    pub fn write(&self, buf: &mut BytesMut) {
        self.write_pre_pow(buf);
        self.pow.write(buf);
    }

    /// The serialized bytes.
    pub fn bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write(&mut buf);
        buf.freeze()
    }

    /// Deserialize from `r`.
    pub fn read(r: &mut Reader) -> Result<Self, ConsensusError> {
        Ok(Self {
            version: r.u16()?,
            height: r.u64()?,
            timestamp: r.i64()?,
            previous: Hash(r.fixed()?),
            previous_root: Hash(r.fixed()?),
            output_root: Hash(r.fixed()?),
            range_proof_root: Hash(r.fixed()?),
            kernel_root: Hash(r.fixed()?),
            total_kernel_offset: Hash(r.fixed()?),
            output_mmr_size: r.u64()?,
            kernel_mmr_size: r.u64()?,
            total_difficulty: Difficulty::from_num(r.u64()?),
            scaling_difficulty: r.u32()?,
            nonce: r.u64()?,
            pow: Proof::read(r)?,
        })
    }

    /// The block hash: BLAKE2b-256 of the packed proof nonces.
    pub fn hash(&self) -> Hash {
        Hash::of(&self.pow.pow_bytes())
    }

    /// Whether the proof belongs to the primary proof-of-work class.
    pub fn is_primary_pow(&self) -> bool {
        self.pow.edge_bits != SECOND_POW_EDGE_BITS
    }

    /// Header-scope rules that do not require walking the cuckoo graph.
    pub fn validate_shape_at(&self, now: i64) -> Result<(), ConsensusError> {
        if !valid_version(self.height, self.version) {
            return Err(ConsensusError::InvalidBlockVersion {
                version: self.version,
                height: self.height,
            });
        }

        // Refuse blocks more than 12 block intervals in the future.
        if self.timestamp - now > 12 * BLOCK_TIME_SEC {
            return Err(ConsensusError::TimestampTooFarInFuture(self.timestamp));
        }

        if self.is_primary_pow() {
            if self.pow.edge_bits < DEFAULT_MIN_EDGE_BITS {
                return Err(ConsensusError::CuckooSizeTooSmall(self.pow.edge_bits));
            }
            if self.scaling_difficulty != 1 {
                return Err(ConsensusError::InvalidScalingDifficulty(
                    self.scaling_difficulty,
                ));
            }
        }

        Ok(())
    }

    /// Verify the proof of work: the achieved difficulty floor and the
    /// cuckoo cycle against the graph keyed by this header.
    pub fn validate_pow(&self) -> Result<(), ConsensusError> {
        if self.pow.nonces.len() != PROOF_SIZE {
            return Err(ConsensusError::InvalidPow);
        }

        let pow_difficulty = self.pow.to_difficulty();
        if pow_difficulty < crate::MINIMUM_DIFFICULTY {
            return Err(ConsensusError::DifficultyTooLow {
                got: pow_difficulty.to_num(),
                required: crate::MINIMUM_DIFFICULTY.to_num(),
            });
        }

        let cuckoo = Cuckaroo::new(&self.pre_pow_bytes());
        if !cuckoo.verify(&self.pow.nonces, self.pow.edge_bits) {
            return Err(ConsensusError::InvalidPow);
        }
        Ok(())
    }

    /// Full header validation.
    pub fn validate_at(&self, now: i64) -> Result<(), ConsensusError> {
        self.validate_shape_at(now)?;
        self.validate_pow()
    }
}

/// A full block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// The header with commitments to the rest of the data.
    pub header: BlockHeader,
    /// Spent outputs.
    pub inputs: Vec<Input>,
    /// Created outputs.
    pub outputs: Vec<Output>,
    /// Transaction kernels.
    pub kernels: Vec<TxKernel>,
}

impl Block {
    /// Serialize into `buf`, emitting inputs, outputs and kernels in
    /// ascending order of their hashes.
    pub fn write(&self, buf: &mut BytesMut) {
        self.header.write(buf);

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
        let header = BlockHeader::read(r)?;

        let inputs = read_count(r, "inputs")?;
        let outputs = read_count(r, "outputs")?;
        let kernels = read_count(r, "kernels")?;

        let block = Self {
            header,
            inputs: read_list(r, inputs, Input::read)?,
            outputs: read_list(r, outputs, Output::read)?,
            kernels: read_list(r, kernels, TxKernel::read)?,
        };

        block.verify_sorted()?;
        Ok(block)
    }

    /// The block hash.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Sum of all kernel fees.
    pub fn total_fees(&self) -> u64 {
        self.kernels.iter().map(|k| k.fee).sum()
    }

    /// Block weight against the consensus capacity.
    pub fn weight(&self) -> u64 {
        self.inputs.len() as u64 * BLOCK_INPUT_WEIGHT
            + self.outputs.len() as u64 * BLOCK_OUTPUT_WEIGHT
            + self.kernels.len() as u64 * BLOCK_KERNEL_WEIGHT
    }

    /// Verify block-scope consensus rules.
    ///
    /// `block_offset` is the kernel offset contributed by this block alone
    /// (the difference between this header's accumulated offset and the
    /// parent's).
    pub fn validate(
        &self,
        now: i64,
        verifier: &dyn RangeProofVerifier,
        block_offset: &[u8; 32],
    ) -> Result<(), ConsensusError> {
        self.header.validate_at(now)?;
        self.validate_body(verifier, block_offset)
    }

    /// Body rules: everything except the header.
    pub fn validate_body(
        &self,
        verifier: &dyn RangeProofVerifier,
        block_offset: &[u8; 32],
    ) -> Result<(), ConsensusError> {
        if self.outputs.is_empty() || self.kernels.is_empty() {
            return Err(ConsensusError::MissingCoinbase);
        }

        self.verify_sorted()?;
        self.verify_weight()?;
        self.verify_coinbase()?;
        self.verify_range_proofs(verifier)?;
        self.verify_kernel_signatures()?;
        self.verify_kernel_sums(block_offset)
    }

    fn verify_sorted(&self) -> Result<(), ConsensusError> {
        if !is_sorted_by_hash(&self.inputs, Input::hash) {
            return Err(ConsensusError::Unsorted("block inputs"));
        }
        if !is_sorted_by_hash(&self.outputs, Output::hash) {
            return Err(ConsensusError::Unsorted("block outputs"));
        }
        if !is_sorted_by_hash(&self.kernels, TxKernel::hash) {
            return Err(ConsensusError::Unsorted("block kernels"));
        }
        Ok(())
    }

    fn verify_weight(&self) -> Result<(), ConsensusError> {
        let weight = self.weight();
        if weight > MAX_BLOCK_WEIGHT {
            return Err(ConsensusError::BlockTooHeavy(weight));
        }
        Ok(())
    }

    fn verify_coinbase(&self) -> Result<(), ConsensusError> {
        let coinbase_outputs = self.outputs.iter().filter(|o| o.is_coinbase()).count();
        if coinbase_outputs > MAX_BLOCK_COINBASE_OUTPUTS {
            return Err(ConsensusError::TooManyCoinbaseOutputs);
        }

        let coinbase_kernels = self.kernels.iter().filter(|k| k.is_coinbase()).count();
        if coinbase_kernels > MAX_BLOCK_COINBASE_KERNELS {
            return Err(ConsensusError::TooManyCoinbaseKernels);
        }

        Ok(())
    }

    fn verify_range_proofs(&self, verifier: &dyn RangeProofVerifier) -> Result<(), ConsensusError> {
        for output in &self.outputs {
            if !verifier.verify(&output.commit, &output.proof) {
                return Err(ConsensusError::InvalidRangeProof);
            }
        }
        Ok(())
    }

    fn verify_kernel_signatures(&self) -> Result<(), ConsensusError> {
        for kernel in &self.kernels {
            kernel.validate()?;
        }
        Ok(())
    }

    /// Check that the commitment sums balance against the kernel excesses.
    /// The block creates exactly the reward in new value on H.
    pub fn verify_kernel_sums(&self, block_offset: &[u8; 32]) -> Result<(), ConsensusError> {
        let inputs: Vec<Commitment> = self.inputs.iter().map(|i| i.commit).collect();
        let outputs: Vec<Commitment> = self.outputs.iter().map(|o| o.commit).collect();
        let excesses: Vec<Commitment> = self.kernels.iter().map(|k| k.excess).collect();

        let balanced =
            excess_sums_match(&inputs, &outputs, &excesses, block_offset, REWARD as i64)?;
        if !balanced {
            return Err(ConsensusError::KernelSumMismatch);
        }
        Ok(())
    }
}

/// Compact representation of a block: the header, the full coinbase outputs
/// and kernels, and short ids for the remaining kernels. A node that has
/// already seen the transactions can hydrate the full block locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactBlock {
    /// The header with commitments to the rest of the data.
    pub header: BlockHeader,
    /// Full outputs, specifically the coinbase output(s).
    pub outputs: Vec<Output>,
    /// Full kernels, specifically the coinbase kernel(s).
    pub kernels: Vec<TxKernel>,
    /// Short ids of the remaining kernels.
    pub kernel_ids: Vec<ShortId>,
}

impl CompactBlock {
    /// Serialize into `buf` with sorted sequences.
    pub fn write(&self, buf: &mut BytesMut) {
        self.header.write(buf);

        buf.put_u8(self.outputs.len() as u8);
        buf.put_u8(self.kernels.len() as u8);
        buf.put_u64(self.kernel_ids.len() as u64);

        for output in sorted_by_hash(&self.outputs, Output::hash) {
            output.write(buf);
        }
        for kernel in sorted_by_hash(&self.kernels, TxKernel::hash) {
            kernel.write(buf);
        }

        let mut ids = self.kernel_ids.clone();
        ids.sort_unstable();
        for id in &ids {
            buf.put_slice(id.as_bytes());
        }
    }

    /// The serialized bytes.
    pub fn bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write(&mut buf);
        buf.freeze()
    }

    /// Deserialize from `r`.
    pub fn read(r: &mut Reader) -> Result<Self, ConsensusError> {
        let header = BlockHeader::read(r)?;

        let outputs = u64::from(r.u8()?);
        let kernels = u64::from(r.u8()?);
        let kernel_ids = r.u64()?;
        if kernel_ids > MAX_TX_PARTS {
            return Err(ConsensusError::TooMany {
                collection: "kernel ids",
                count: kernel_ids,
                max: MAX_TX_PARTS,
            });
        }

        let block = Self {
            header,
            outputs: read_list(r, outputs, Output::read)?,
            kernels: read_list(r, kernels, TxKernel::read)?,
            kernel_ids: read_list(r, kernel_ids, |r| Ok(ShortId(r.fixed()?)))?,
        };

        if !is_sorted_by_hash(&block.outputs, Output::hash)
            || !is_sorted_by_hash(&block.kernels, TxKernel::hash)
        {
            return Err(ConsensusError::Unsorted("compact block parts"));
        }
        if block.kernel_ids.windows(2).any(|w| w[1] < w[0]) {
            return Err(ConsensusError::Unsorted("compact block kernel ids"));
        }

        Ok(block)
    }

    /// The block hash.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }
}

pub(crate) fn read_count(r: &mut Reader, collection: &'static str) -> Result<u64, ConsensusError> {
    let count = r.u64()?;
    if count > MAX_TX_PARTS {
        return Err(ConsensusError::TooMany {
            collection,
            count,
            max: MAX_TX_PARTS,
        });
    }
    Ok(count)
}

pub(crate) fn read_list<T>(
    r: &mut Reader,
    count: u64,
    read_one: impl Fn(&mut Reader) -> Result<T, ConsensusError>,
) -> Result<Vec<T>, ConsensusError> {
    let mut items = Vec::with_capacity(count.min(4096) as usize);
    for _ in 0..count {
        items.push(read_one(r)?);
    }
    Ok(items)
}

pub(crate) fn sorted_by_hash<'a, T>(items: &'a [T], hash: impl Fn(&T) -> Hash) -> Vec<&'a T> {
    let mut refs: Vec<&T> = items.iter().collect();
    refs.sort_by_key(|item| hash(item));
    refs
}

pub(crate) fn is_sorted_by_hash<T>(items: &[T], hash: impl Fn(&T) -> Hash) -> bool {
    items.windows(2).all(|w| hash(&w[0]) <= hash(&w[1]))
}
