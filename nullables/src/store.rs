//! Nullable store: thread-safe in-memory chain storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use strata_ledger::Block;
use strata_store::{ChainStore, ScanRecord, StoreError, WriteBatch, WriteOp};
use strata_transactions::Transaction;
use strata_types::{BlockId, TransactionId, TxHash};

#[derive(Clone, Default)]
struct Tables {
    by_height: BTreeMap<u32, Block>,
    heights: HashMap<BlockId, u32>,
    tx_index: HashMap<TransactionId, u32>,
    tx_hashes: HashMap<TxHash, u32>,
    scan_record: Option<ScanRecord>,
}

impl Tables {
    fn put_block(&mut self, block: Block) {
        for tx in &block.transactions {
            self.tx_index.insert(tx.id(), block.height);
            self.tx_hashes.insert(tx.full_hash(), block.height);
        }
        self.heights.insert(block.id(), block.height);
        self.by_height.insert(block.height, block);
    }

    fn delete_blocks_from(&mut self, height: u32) {
        for (_, block) in self.by_height.split_off(&height) {
            self.heights.remove(&block.id());
            for tx in &block.transactions {
                self.tx_index.remove(&tx.id());
                self.tx_hashes.remove(&tx.full_hash());
            }
        }
    }
}

/// In-memory [`ChainStore`]. A batch is applied to a copy of the tables and
/// swapped in only when every op succeeded.
#[derive(Default)]
pub struct NullStore {
    tables: Mutex<Tables>,
    fail_next_write: AtomicBool,
    writes: Mutex<u64>,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `write` fail with a backend error without applying it.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Number of batches committed so far.
    pub fn write_count(&self) -> u64 {
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn block_count(&self) -> usize {
        self.tables().by_height.len()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChainStore for NullStore {
    fn last_block(&self) -> Result<Option<Block>, StoreError> {
        Ok(self.tables().by_height.values().next_back().cloned())
    }

    fn block(&self, id: BlockId) -> Result<Option<Block>, StoreError> {
        let tables = self.tables();
        Ok(tables
            .heights
            .get(&id)
            .and_then(|h| tables.by_height.get(h))
            .cloned())
    }

    fn block_at_height(&self, height: u32) -> Result<Option<Block>, StoreError> {
        Ok(self.tables().by_height.get(&height).cloned())
    }

    fn blocks_from_height(&self, height: u32, limit: usize) -> Result<Vec<Block>, StoreError> {
        Ok(self
            .tables()
            .by_height
            .range(height..)
            .take(limit)
            .map(|(_, b)| b.clone())
            .collect())
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        let tables = self.tables();
        let Some(block) = tables.tx_index.get(&id).and_then(|h| tables.by_height.get(h)) else {
            return Ok(None);
        };
        Ok(block.transactions.iter().find(|tx| tx.id() == id).cloned())
    }

    fn transaction_height(&self, id: TransactionId) -> Result<Option<u32>, StoreError> {
        Ok(self.tables().tx_index.get(&id).copied())
    }

    fn transaction_height_by_full_hash(
        &self,
        full_hash: &TxHash,
    ) -> Result<Option<u32>, StoreError> {
        Ok(self.tables().tx_hashes.get(full_hash).copied())
    }

    fn scan_record(&self) -> Result<Option<ScanRecord>, StoreError> {
        Ok(self.tables().scan_record)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        let mut tables = self.tables();
        let mut next = tables.clone();
        for op in batch.into_ops() {
            match op {
                WriteOp::PutBlock(block) => next.put_block(*block),
                WriteOp::DeleteBlocksFrom(height) => next.delete_blocks_from(height),
                WriteOp::PutScanRecord(record) => next.scan_record = Some(record),
                WriteOp::ClearScanRecord => next.scan_record = None,
            }
        }
        *tables = next;
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_crypto::keypair_from_seed;
    use strata_ledger::Genesis;
    use strata_types::AccountId;

    fn two_blocks() -> (Block, Block) {
        let genesis = Genesis::single(AccountId::new(1), 100).block();
        let kp = keypair_from_seed(&[4u8; 32]);
        let mut next = Block::assemble(
            1,
            &genesis,
            genesis.timestamp.plus_secs(10),
            Vec::new(),
            &kp,
            [0u8; 32],
            genesis.base_target,
        )
        .unwrap();
        next.link_to(&genesis);
        (genesis, next)
    }

    #[test]
    fn head_follows_writes() {
        let store = NullStore::new();
        let (genesis, next) = two_blocks();
        let mut batch = WriteBatch::new();
        batch.put_block(genesis.clone()).put_block(next.clone());
        store.write(batch).unwrap();
        assert_eq!(store.last_block().unwrap(), Some(next.clone()));
        assert_eq!(store.block_ids_after(genesis.id(), 5).unwrap(), vec![next.id()]);

        let mut batch = WriteBatch::new();
        batch.delete_blocks_from(1);
        store.write(batch).unwrap();
        assert_eq!(store.last_block().unwrap(), Some(genesis));
        assert!(!store.has_block(next.id()).unwrap());
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn injected_failure_leaves_tables_untouched() {
        let store = NullStore::new();
        let (genesis, _) = two_blocks();
        store.fail_next_write();
        let mut batch = WriteBatch::new();
        batch.put_block(genesis.clone());
        assert!(store.write(batch.clone()).is_err());
        assert_eq!(store.block_count(), 0);
        store.write(batch).unwrap();
        assert_eq!(store.block_count(), 1);
    }
}
