use strata_ledger::{LedgerError, RollbackError};
use strata_network::NetworkError;
use strata_store::StoreError;
use strata_transactions::TransactionError;
use strata_types::{BlockId, Timestamp, TransactionId};
use thiserror::Error;

/// Why a block header or its declared totals were refused.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BlockRejection {
    #[error("previous block {previous} is not the head {head}")]
    NotLinked { previous: BlockId, head: BlockId },

    #[error("block is already in the chain")]
    Duplicate,

    #[error("block id is zero")]
    ZeroId,

    #[error("version {found}, expected {expected}")]
    BadVersion { expected: u8, found: u8 },

    #[error("timestamp is not after the previous block")]
    TimestampNotAfterParent,

    #[error("timestamp {timestamp} is too far in the future")]
    TimestampInFuture { timestamp: Timestamp },

    #[error("previous block hash does not match")]
    PreviousHashMismatch,

    #[error("generation signature does not verify")]
    BadGenerationSignature,

    #[error("block signature does not verify")]
    BadBlockSignature,

    #[error("base target does not follow from the previous block")]
    BaseTargetMismatch,

    #[error("producer may not produce before {earliest}")]
    BeforeProducerSlot { earliest: Timestamp },

    #[error("producer is not eligible")]
    ProducerIneligible,

    #[error("{count} transactions, limit is {max}")]
    TooManyTransactions { count: usize, max: u32 },

    #[error("payload length {length}, limit is {max}")]
    PayloadTooLong { length: u32, max: u32 },

    #[error("declared totals do not match the transactions")]
    TotalsMismatch,

    #[error("transaction {0} appears twice")]
    RepeatedTransaction(TransactionId),

    #[error("stored block does not hash to its id")]
    IdMismatch,
}

/// Errors surfaced by the chain service.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("block {block} rejected: {reason}")]
    BlockRejected { block: BlockId, reason: BlockRejection },

    #[error("transaction {id} rejected: {source}")]
    TransactionRejected {
        id: TransactionId,
        source: TransactionError,
    },

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("peer failure: {0}")]
    Peer(#[from] NetworkError),

    #[error("replay diverged at height {height}: {reason}")]
    ReplayDivergence { height: u32, reason: String },

    #[error("derived state: {0}")]
    Rollback(#[from] RollbackError),

    #[error("ledger invariant violated: {0}")]
    Ledger(#[from] LedgerError),
}

impl ChainError {
    pub(crate) fn block(block: BlockId, reason: BlockRejection) -> Self {
        Self::BlockRejected { block, reason }
    }

    pub(crate) fn transaction(id: TransactionId, source: TransactionError) -> Self {
        Self::TransactionRejected { id, source }
    }

    /// Whether the peer that supplied the block should be blacklisted.
    pub fn is_peer_fault(&self) -> bool {
        match self {
            Self::BlockRejected { reason, .. } => !matches!(
                reason,
                BlockRejection::NotLinked { .. } | BlockRejection::Duplicate
            ),
            Self::TransactionRejected { .. } => true,
            Self::Peer(e) => e.is_misbehaviour(),
            Self::Storage(_) | Self::ReplayDivergence { .. } | Self::Rollback(_) | Self::Ledger(_) => {
                false
            }
        }
    }

    /// Rejected transaction, when the error is attributable to one.
    pub fn rejected_transaction(&self) -> Option<TransactionId> {
        match self {
            Self::TransactionRejected { id, .. } => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("config error: {0}")]
    Config(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for NodeError {
    fn from(e: StoreError) -> Self {
        NodeError::Chain(ChainError::Storage(e))
    }
}
