//! Typed publish/subscribe for chain lifecycle events.
//!
//! Handlers run inline on the publishing thread. The chain publishes only
//! after releasing its lock, so a handler may query the chain, but it should
//! stay quick because the mutating caller waits for it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use strata_ledger::Block;
use strata_transactions::Transaction;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChainEventKind {
    BeforeBlockAccept,
    AfterBlockAccept,
    BlockPushed,
    BlockPopped,
    BeforeBlockApply,
    AfterBlockApply,
    BlockScanned,
    RescanBegin,
    RescanEnd,
    BlockGenerated,
    AddedUnconfirmedTransactions,
    RemovedUnconfirmedTransactions,
    AddedConfirmedTransactions,
    ReleasePhasedTransaction,
}

#[derive(Clone, Debug)]
pub enum ChainEvent {
    BeforeBlockAccept(Arc<Block>),
    AfterBlockAccept(Arc<Block>),
    BlockPushed(Arc<Block>),
    BlockPopped(Arc<Block>),
    BeforeBlockApply(Arc<Block>),
    AfterBlockApply(Arc<Block>),
    BlockScanned(Arc<Block>),
    RescanBegin { from_height: u32 },
    RescanEnd { height: u32 },
    BlockGenerated(Arc<Block>),
    AddedUnconfirmedTransactions(Vec<Transaction>),
    RemovedUnconfirmedTransactions(Vec<Transaction>),
    AddedConfirmedTransactions(Vec<Transaction>),
    ReleasePhasedTransaction(Transaction),
}

impl ChainEvent {
    pub fn kind(&self) -> ChainEventKind {
        match self {
            Self::BeforeBlockAccept(_) => ChainEventKind::BeforeBlockAccept,
            Self::AfterBlockAccept(_) => ChainEventKind::AfterBlockAccept,
            Self::BlockPushed(_) => ChainEventKind::BlockPushed,
            Self::BlockPopped(_) => ChainEventKind::BlockPopped,
            Self::BeforeBlockApply(_) => ChainEventKind::BeforeBlockApply,
            Self::AfterBlockApply(_) => ChainEventKind::AfterBlockApply,
            Self::BlockScanned(_) => ChainEventKind::BlockScanned,
            Self::RescanBegin { .. } => ChainEventKind::RescanBegin,
            Self::RescanEnd { .. } => ChainEventKind::RescanEnd,
            Self::BlockGenerated(_) => ChainEventKind::BlockGenerated,
            Self::AddedUnconfirmedTransactions(_) => ChainEventKind::AddedUnconfirmedTransactions,
            Self::RemovedUnconfirmedTransactions(_) => {
                ChainEventKind::RemovedUnconfirmedTransactions
            }
            Self::AddedConfirmedTransactions(_) => ChainEventKind::AddedConfirmedTransactions,
            Self::ReleasePhasedTransaction(_) => ChainEventKind::ReleasePhasedTransaction,
        }
    }

    /// The block this event is about, if any.
    pub fn block(&self) -> Option<&Block> {
        match self {
            Self::BeforeBlockAccept(b)
            | Self::AfterBlockAccept(b)
            | Self::BlockPushed(b)
            | Self::BlockPopped(b)
            | Self::BeforeBlockApply(b)
            | Self::AfterBlockApply(b)
            | Self::BlockScanned(b)
            | Self::BlockGenerated(b) => Some(b),
            _ => None,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&ChainEvent) + Send + Sync>;

/// Synchronous fan-out bus keyed by event kind.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<ChainEventKind, Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: ChainEventKind, handler: F)
    where
        F: Fn(&ChainEvent) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Register one handler for several kinds.
    pub fn subscribe_all<F>(&self, kinds: &[ChainEventKind], handler: F)
    where
        F: Fn(&ChainEvent) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        for kind in kinds {
            handlers.entry(*kind).or_default().push(Arc::clone(&handler));
        }
    }

    pub fn publish(&self, event: ChainEvent) {
        // Handlers are cloned out so a handler may subscribe without deadlocking.
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(&event);
        }
    }

    pub fn subscriber_count(&self, kind: ChainEventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }
}
