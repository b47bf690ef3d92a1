//! Genesis blocks.

use mw_consensus::{
    Block, BlockHeader, Difficulty, Hash, Proof, BLOCK_HASH_SIZE, DEFAULT_SIZE_SHIFT,
};

/// The mainnet genesis block.
pub fn mainnet() -> Block {
    Block {
        header: BlockHeader {
            version: 1,
            height: 0,
            // 2018-08-14 00:00:00 UTC
            timestamp: 1_534_204_800,
            previous: Hash([0xff; BLOCK_HASH_SIZE]),
            previous_root: Hash::ZERO,
            output_root: Hash::ZERO,
            range_proof_root: Hash::ZERO,
            kernel_root: Hash::ZERO,
            total_kernel_offset: Hash::ZERO,
            output_mmr_size: 0,
            kernel_mmr_size: 0,
            total_difficulty: Difficulty::from_num(1000),
            scaling_difficulty: 1,
            nonce: 28205,
            pow: Proof::new(
                DEFAULT_SIZE_SHIFT,
                vec![
                    0x21e, 0x7a2, 0xeae, 0x144e, 0x1b1c, 0x1fbd, 0x203a, 0x214b, 0x293b, 0x2b74,
                    0x2bfa, 0x2c26, 0x32bb, 0x346a, 0x34c7, 0x37c5, 0x4164, 0x42cc, 0x4cc3,
                    0x55af, 0x5a70, 0x5b14, 0x5e1c, 0x5f76, 0x6061, 0x60f9, 0x61d7, 0x6318,
                    0x63a1, 0x63fb, 0x649b, 0x64e5, 0x65a1, 0x6b69, 0x70f8, 0x71c7, 0x71cd,
                    0x7492, 0x7b11, 0x7db8, 0x7f29, 0x7ff8,
                ],
            ),
        },
        inputs: vec![],
        outputs: vec![],
        kernels: vec![],
    }
}
