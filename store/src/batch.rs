use strata_ledger::Block;

use crate::scan::ScanRecord;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
    /// Store a linked block (its `height` is set) and index its transactions.
    PutBlock(Box<Block>),
    /// Delete every block at or above this height, with its transaction rows.
    DeleteBlocksFrom(u32),
    PutScanRecord(ScanRecord),
    ClearScanRecord,
}

/// Ordered group of writes applied in one storage transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_block(&mut self, block: Block) -> &mut Self {
        self.ops.push(WriteOp::PutBlock(Box::new(block)));
        self
    }

    pub fn delete_blocks_from(&mut self, height: u32) -> &mut Self {
        self.ops.push(WriteOp::DeleteBlocksFrom(height));
        self
    }

    pub fn put_scan_record(&mut self, record: ScanRecord) -> &mut Self {
        self.ops.push(WriteOp::PutScanRecord(record));
        self
    }

    pub fn clear_scan_record(&mut self) -> &mut Self {
        self.ops.push(WriteOp::ClearScanRecord);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}
