//! The block value.
//!
//! A block is immutable once accepted. `height` and `cumulative_difficulty`
//! are not covered by the signature; the acceptor fills them in from the
//! parent when the block is linked into the chain.

use serde::{Deserialize, Serialize};
use strata_crypto::{blake2b_256, sign_message, verify_signature, PayloadHasher};
use strata_transactions::Transaction;
use strata_types::{BlockHash, BlockId, KeyPair, PublicKey, Signature, Timestamp, TransactionId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub version: u8,
    pub timestamp: Timestamp,
    pub previous_block_id: BlockId,
    pub previous_block_hash: BlockHash,
    pub total_amount: u64,
    pub total_fee: u64,
    pub payload_length: u32,
    pub payload_hash: [u8; 32],
    pub generator_public_key: PublicKey,
    pub generation_signature: [u8; 32],
    pub base_target: u64,
    pub transactions: Vec<Transaction>,
    pub block_signature: Signature,
    pub height: u32,
    #[serde(with = "strata_types::decimal")]
    pub cumulative_difficulty: u128,
}

/// Totals a block declares over its transactions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PayloadTotals {
    pub total_amount: u64,
    pub total_fee: u64,
    pub payload_length: u32,
    pub payload_hash: [u8; 32],
}

impl PayloadTotals {
    /// `None` when a sum overflows.
    pub fn compute(transactions: &[Transaction]) -> Option<Self> {
        let mut hasher = PayloadHasher::new();
        let mut total_amount = 0u64;
        let mut total_fee = 0u64;
        for tx in transactions {
            total_amount = total_amount.checked_add(tx.amount)?;
            total_fee = total_fee.checked_add(tx.fee)?;
            hasher.update(&tx.bytes());
        }
        let payload_length = u32::try_from(hasher.length()).ok()?;
        Some(Self {
            total_amount,
            total_fee,
            payload_length,
            payload_hash: hasher.finalize(),
        })
    }
}

impl Block {
    /// Build and sign a block on top of `previous`.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        version: u8,
        previous: &Block,
        timestamp: Timestamp,
        transactions: Vec<Transaction>,
        generator: &KeyPair,
        generation_signature: [u8; 32],
        base_target: u64,
    ) -> Option<Self> {
        let totals = PayloadTotals::compute(&transactions)?;
        let mut block = Self {
            version,
            timestamp,
            previous_block_id: previous.id(),
            previous_block_hash: previous.hash(),
            total_amount: totals.total_amount,
            total_fee: totals.total_fee,
            payload_length: totals.payload_length,
            payload_hash: totals.payload_hash,
            generator_public_key: generator.public,
            generation_signature,
            base_target,
            transactions,
            block_signature: Signature::EMPTY,
            height: 0,
            cumulative_difficulty: 0,
        };
        block.sign(generator);
        Some(block)
    }

    /// Bytes covered by the block signature.
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(200);
        out.push(self.version);
        out.extend_from_slice(&self.timestamp.as_secs().to_le_bytes());
        out.extend_from_slice(&self.previous_block_id.to_le_bytes());
        out.extend_from_slice(self.previous_block_hash.as_bytes());
        out.extend_from_slice(&(self.transactions.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.total_amount.to_le_bytes());
        out.extend_from_slice(&self.total_fee.to_le_bytes());
        out.extend_from_slice(&self.payload_length.to_le_bytes());
        out.extend_from_slice(&self.payload_hash);
        out.extend_from_slice(self.generator_public_key.as_bytes());
        out.extend_from_slice(&self.generation_signature);
        out.extend_from_slice(&self.base_target.to_le_bytes());
        out
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut out = self.unsigned_bytes();
        out.extend_from_slice(self.block_signature.as_bytes());
        out
    }

    pub fn hash(&self) -> BlockHash {
        BlockHash::new(blake2b_256(&self.bytes()))
    }

    pub fn id(&self) -> BlockId {
        self.hash().id()
    }

    pub fn sign(&mut self, generator: &KeyPair) {
        self.block_signature = sign_message(&self.unsigned_bytes(), &generator.private);
    }

    pub fn verify_block_signature(&self) -> bool {
        verify_signature(
            &self.unsigned_bytes(),
            &self.block_signature,
            &self.generator_public_key,
        )
    }

    pub fn transaction_ids(&self) -> Vec<TransactionId> {
        self.transactions.iter().map(Transaction::id).collect()
    }

    /// Chain weight contributed by a block with this base target.
    pub fn difficulty(&self) -> u128 {
        (1u128 << 64) / u128::from(self.base_target.max(1))
    }

    /// Fill in the fields derived from the parent.
    pub fn link_to(&mut self, previous: &Block) {
        self.height = previous.height + 1;
        self.cumulative_difficulty = previous.cumulative_difficulty + self.difficulty();
    }
}
