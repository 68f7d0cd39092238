//! Bounded cache of recently read blocks.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use strata_ledger::Block;
use strata_types::BlockId;

/// FIFO-evicting block cache. The chain fills and clears it under its lock
/// and clears it whenever blocks leave the store.
pub struct BlockCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    blocks: HashMap<BlockId, Arc<Block>>,
    order: VecDeque<BlockId>,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn get(&self, id: BlockId) -> Option<Arc<Block>> {
        self.lock().blocks.get(&id).cloned()
    }

    pub fn insert(&self, block: Arc<Block>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.lock();
        let id = block.id();
        if inner.blocks.insert(id, block).is_none() {
            inner.order.push_back(id);
        }
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.blocks.remove(&oldest);
            }
        }
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.blocks.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
