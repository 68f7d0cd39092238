//! The chain storage contract.

use strata_ledger::Block;
use strata_transactions::Transaction;
use strata_types::{BlockId, TransactionId, TxHash};

use crate::batch::WriteBatch;
use crate::error::StoreError;
use crate::scan::ScanRecord;

pub trait ChainStore: Send + Sync {
    /// Highest stored block, or `None` for an empty store.
    fn last_block(&self) -> Result<Option<Block>, StoreError>;

    fn block(&self, id: BlockId) -> Result<Option<Block>, StoreError>;

    fn block_at_height(&self, height: u32) -> Result<Option<Block>, StoreError>;

    /// Up to `limit` blocks starting at `height`, ascending.
    fn blocks_from_height(&self, height: u32, limit: usize) -> Result<Vec<Block>, StoreError>;

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError>;

    /// Height of the block confirming `id`.
    fn transaction_height(&self, id: TransactionId) -> Result<Option<u32>, StoreError>;

    fn transaction_height_by_full_hash(&self, full_hash: &TxHash)
        -> Result<Option<u32>, StoreError>;

    fn scan_record(&self) -> Result<Option<ScanRecord>, StoreError>;

    /// Apply every op in `batch` atomically.
    fn write(&self, batch: WriteBatch) -> Result<(), StoreError>;

    // ── Derived lookups ──────────────────────────────────────────────────

    fn has_block(&self, id: BlockId) -> Result<bool, StoreError> {
        Ok(self.block(id)?.is_some())
    }

    fn has_transaction(&self, id: TransactionId) -> Result<bool, StoreError> {
        Ok(self.transaction_height(id)?.is_some())
    }

    fn block_id_at_height(&self, height: u32) -> Result<Option<BlockId>, StoreError> {
        Ok(self.block_at_height(height)?.map(|b| b.id()))
    }

    /// Up to `limit` blocks following block `id`, ascending. Empty if `id`
    /// is unknown.
    fn blocks_after(&self, id: BlockId, limit: usize) -> Result<Vec<Block>, StoreError> {
        match self.block(id)? {
            Some(block) => self.blocks_from_height(block.height + 1, limit),
            None => Ok(Vec::new()),
        }
    }

    fn block_ids_after(&self, id: BlockId, limit: usize) -> Result<Vec<BlockId>, StoreError> {
        Ok(self
            .blocks_after(id, limit)?
            .iter()
            .map(Block::id)
            .collect())
    }
}
