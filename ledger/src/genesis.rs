//! The genesis block.
//!
//! Genesis is built deterministically from an allocation list. The list is
//! hashed into the block's payload hash, so nodes configured with different
//! allocations disagree on the genesis id and never link up.

use serde::{Deserialize, Serialize};
use strata_crypto::{blake2b_256_multi, keypair_from_seed};
use strata_types::{AccountId, BlockHash, BlockId, Timestamp};

use crate::block::Block;

const GENESIS_SEED: [u8; 32] = *b"strata-genesis-producer-seed-v01";

/// Initial allocation of coins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    pub timestamp: Timestamp,
    pub base_target: u64,
    pub allocations: Vec<(AccountId, u64)>,
}

impl Genesis {
    /// A genesis crediting one account.
    pub fn single(account: AccountId, amount: u64) -> Self {
        Self {
            timestamp: Timestamp::EPOCH,
            base_target: 153_722_867,
            allocations: vec![(account, amount)],
        }
    }

    fn allocations_hash(&self) -> [u8; 32] {
        let encoded: Vec<[u8; 16]> = self
            .allocations
            .iter()
            .map(|(account, amount)| {
                let mut row = [0u8; 16];
                row[..8].copy_from_slice(&account.to_le_bytes());
                row[8..].copy_from_slice(&amount.to_le_bytes());
                row
            })
            .collect();
        let parts: Vec<&[u8]> = encoded.iter().map(|row| row.as_slice()).collect();
        blake2b_256_multi(&parts)
    }

    /// The height-0 block.
    pub fn block(&self) -> Block {
        let producer = keypair_from_seed(&GENESIS_SEED);
        let mut block = Block {
            version: 1,
            timestamp: self.timestamp,
            previous_block_id: BlockId::ZERO,
            previous_block_hash: BlockHash::ZERO,
            total_amount: 0,
            total_fee: 0,
            payload_length: 0,
            payload_hash: self.allocations_hash(),
            generator_public_key: producer.public,
            generation_signature: [0u8; 32],
            base_target: self.base_target,
            transactions: Vec::new(),
            block_signature: strata_types::Signature::EMPTY,
            height: 0,
            cumulative_difficulty: 0,
        };
        block.sign(&producer);
        block.cumulative_difficulty = block.difficulty();
        block
    }
}
