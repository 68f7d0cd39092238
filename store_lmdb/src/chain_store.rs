//! LMDB implementation of [`ChainStore`].

use std::ops::Bound;

use heed::{RoTxn, RwTxn};
use strata_ledger::Block;
use strata_store::{ChainStore, ScanRecord, StoreError, WriteBatch, WriteOp};
use strata_transactions::Transaction;
use strata_types::{BlockId, TransactionId, TxHash};

use crate::environment::LmdbEnvironment;
use crate::LmdbError;

const SCAN_RECORD_KEY: &[u8] = b"scan_record";

pub struct LmdbChainStore {
    env: LmdbEnvironment,
}

fn decode_height(bytes: &[u8]) -> Result<u32, LmdbError> {
    let arr: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| LmdbError::Corruption("height key shorter than 4 bytes".into()))?;
    Ok(u32::from_be_bytes(arr))
}

fn decode_id(bytes: &[u8]) -> Result<u64, LmdbError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LmdbError::Corruption(format!("id of {} bytes", bytes.len())))?;
    Ok(u64::from_le_bytes(arr))
}

impl LmdbChainStore {
    pub fn new(env: LmdbEnvironment) -> Self {
        Self { env }
    }

    pub fn environment(&self) -> &LmdbEnvironment {
        &self.env
    }

    fn read_block(&self, rtxn: &RoTxn, id: BlockId) -> Result<Option<Block>, LmdbError> {
        match self.env.blocks_db.get(rtxn, &id.to_le_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    fn id_at_height(&self, rtxn: &RoTxn, height: u32) -> Result<Option<BlockId>, LmdbError> {
        match self.env.heights_db.get(rtxn, &height.to_be_bytes())? {
            Some(bytes) => Ok(Some(BlockId::new(decode_id(bytes)?))),
            None => Ok(None),
        }
    }

    fn ids_from_height(
        &self,
        rtxn: &RoTxn,
        height: u32,
        limit: usize,
    ) -> Result<Vec<BlockId>, LmdbError> {
        let start = height.to_be_bytes();
        let range = (Bound::Included(&start[..]), Bound::Unbounded);
        let mut ids = Vec::new();
        for entry in self.env.heights_db.range(rtxn, &range)?.take(limit) {
            let (_, value) = entry?;
            ids.push(BlockId::new(decode_id(value)?));
        }
        Ok(ids)
    }

    fn put_block(&self, wtxn: &mut RwTxn, block: &Block) -> Result<(), LmdbError> {
        let id = block.id();
        let height = block.height.to_be_bytes();
        let bytes = bincode::serialize(block)?;
        self.env.blocks_db.put(wtxn, &id.to_le_bytes(), &bytes)?;
        self.env.heights_db.put(wtxn, &height, &id.to_le_bytes())?;
        let mut index = [0u8; 12];
        index[..4].copy_from_slice(&height);
        index[4..].copy_from_slice(&id.to_le_bytes());
        for tx in &block.transactions {
            self.env.tx_index_db.put(wtxn, &tx.id().to_le_bytes(), &index)?;
            self.env
                .tx_hashes_db
                .put(wtxn, tx.full_hash().as_bytes(), &height)?;
        }
        Ok(())
    }

    fn delete_blocks_from(&self, wtxn: &mut RwTxn, height: u32) -> Result<usize, LmdbError> {
        let start = height.to_be_bytes();
        let range = (Bound::Included(&start[..]), Bound::Unbounded);
        let mut doomed = Vec::new();
        for entry in self.env.heights_db.range(wtxn, &range)? {
            let (key, value) = entry?;
            doomed.push((key.to_vec(), BlockId::new(decode_id(value)?)));
        }
        for (height_key, id) in &doomed {
            if let Some(block) = self.read_block(wtxn, *id)? {
                for tx in &block.transactions {
                    self.env.tx_index_db.delete(wtxn, &tx.id().to_le_bytes())?;
                    self.env.tx_hashes_db.delete(wtxn, tx.full_hash().as_bytes())?;
                }
            }
            self.env.blocks_db.delete(wtxn, &id.to_le_bytes())?;
            self.env.heights_db.delete(wtxn, height_key)?;
        }
        Ok(doomed.len())
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), LmdbError> {
        let mut wtxn = self.env.env.write_txn()?;
        for op in batch.into_ops() {
            match op {
                WriteOp::PutBlock(block) => self.put_block(&mut wtxn, &block)?,
                WriteOp::DeleteBlocksFrom(height) => {
                    let deleted = self.delete_blocks_from(&mut wtxn, height)?;
                    tracing::debug!(height, deleted, "deleted blocks");
                }
                WriteOp::PutScanRecord(record) => {
                    let bytes = bincode::serialize(&record)?;
                    self.env.meta_db.put(&mut wtxn, SCAN_RECORD_KEY, &bytes)?;
                }
                WriteOp::ClearScanRecord => {
                    self.env.meta_db.delete(&mut wtxn, SCAN_RECORD_KEY)?;
                }
            }
        }
        // Dropping `wtxn` on an early return aborts the whole batch.
        wtxn.commit()?;
        Ok(())
    }
}

impl ChainStore for LmdbChainStore {
    fn last_block(&self) -> Result<Option<Block>, StoreError> {
        let rtxn = self.env.env.read_txn().map_err(LmdbError::from)?;
        let Some((_, value)) = self.env.heights_db.last(&rtxn).map_err(LmdbError::from)? else {
            return Ok(None);
        };
        let id = BlockId::new(decode_id(value)?);
        Ok(self.read_block(&rtxn, id)?)
    }

    fn block(&self, id: BlockId) -> Result<Option<Block>, StoreError> {
        let rtxn = self.env.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.read_block(&rtxn, id)?)
    }

    fn block_at_height(&self, height: u32) -> Result<Option<Block>, StoreError> {
        let rtxn = self.env.env.read_txn().map_err(LmdbError::from)?;
        match self.id_at_height(&rtxn, height)? {
            Some(id) => Ok(self.read_block(&rtxn, id)?),
            None => Ok(None),
        }
    }

    fn block_id_at_height(&self, height: u32) -> Result<Option<BlockId>, StoreError> {
        let rtxn = self.env.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.id_at_height(&rtxn, height)?)
    }

    fn blocks_from_height(&self, height: u32, limit: usize) -> Result<Vec<Block>, StoreError> {
        let rtxn = self.env.env.read_txn().map_err(LmdbError::from)?;
        let mut blocks = Vec::new();
        for id in self.ids_from_height(&rtxn, height, limit)? {
            let block = self
                .read_block(&rtxn, id)?
                .ok_or_else(|| LmdbError::Corruption(format!("height index names missing block {id}")))?;
            blocks.push(block);
        }
        Ok(blocks)
    }

    fn block_ids_after(&self, id: BlockId, limit: usize) -> Result<Vec<BlockId>, StoreError> {
        let rtxn = self.env.env.read_txn().map_err(LmdbError::from)?;
        match self.read_block(&rtxn, id)? {
            Some(block) => Ok(self.ids_from_height(&rtxn, block.height + 1, limit)?),
            None => Ok(Vec::new()),
        }
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        let rtxn = self.env.env.read_txn().map_err(LmdbError::from)?;
        let Some(index) = self
            .env
            .tx_index_db
            .get(&rtxn, &id.to_le_bytes())
            .map_err(LmdbError::from)?
        else {
            return Ok(None);
        };
        let block_id = BlockId::new(decode_id(index.get(4..).unwrap_or_default())?);
        let block = self
            .read_block(&rtxn, block_id)?
            .ok_or_else(|| LmdbError::Corruption(format!("tx {id} indexed in missing block")))?;
        Ok(block.transactions.into_iter().find(|tx| tx.id() == id))
    }

    fn transaction_height(&self, id: TransactionId) -> Result<Option<u32>, StoreError> {
        let rtxn = self.env.env.read_txn().map_err(LmdbError::from)?;
        match self
            .env
            .tx_index_db
            .get(&rtxn, &id.to_le_bytes())
            .map_err(LmdbError::from)?
        {
            Some(index) => Ok(Some(decode_height(index)?)),
            None => Ok(None),
        }
    }

    fn transaction_height_by_full_hash(
        &self,
        full_hash: &TxHash,
    ) -> Result<Option<u32>, StoreError> {
        let rtxn = self.env.env.read_txn().map_err(LmdbError::from)?;
        match self
            .env
            .tx_hashes_db
            .get(&rtxn, full_hash.as_bytes())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => Ok(Some(decode_height(bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_record(&self) -> Result<Option<ScanRecord>, StoreError> {
        let rtxn = self.env.env.read_txn().map_err(LmdbError::from)?;
        match self
            .env
            .meta_db
            .get(&rtxn, SCAN_RECORD_KEY)
            .map_err(LmdbError::from)?
        {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes).map_err(LmdbError::from)?)),
            None => Ok(None),
        }
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        Ok(self.apply(batch)?)
    }
}
