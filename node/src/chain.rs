//! The chain service: the single owner of the head, derived state and pool.
//!
//! Every mutation (push, pop-off, rescan, pool admission) takes the
//! exclusive lock for its whole duration. Read-only queries take the shared
//! lock. Events raised by a mutation are queued on the state and published
//! once the exclusive lock is released, so handlers may query the chain.
//! Block acceptance, replay, admission and assembly live in sibling modules
//! as further `impl Chain` blocks.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;

use strata_ledger::{
    AccountInfo, Alias, Block, DerivedState, Genesis, HitVerifier, Ledger, PhasingPoll,
    StakeHitVerifier, TransactionTypeRegistry,
};
use strata_store::{ChainStore, WriteBatch};
use strata_transactions::Transaction;
use strata_types::{
    AccountId, BlockId, Clock, ProtocolParams, SystemClock, Timestamp, TransactionId, TxHash,
};

use crate::cache::BlockCache;
use crate::config::NodeConfig;
use crate::error::ChainError;
use crate::events::{ChainEvent, EventBus};
use crate::pool::UnconfirmedPool;

/// Everything needed to open a [`Chain`].
pub struct ChainOptions {
    pub params: ProtocolParams,
    pub genesis: Genesis,
    pub registry: TransactionTypeRegistry,
    pub hit: Arc<dyn HitVerifier>,
    pub clock: Arc<dyn Clock>,
    pub events: Arc<EventBus>,
    /// Extra height-tracking views rolled back alongside the ledger.
    pub derived: Vec<Box<dyn DerivedState>>,
    pub max_unconfirmed_transactions: usize,
    pub max_waiting_secs: u64,
    pub enable_trimming: bool,
    pub trim_frequency: u32,
    pub block_cache_size: usize,
}

impl ChainOptions {
    pub fn new(params: ProtocolParams, genesis: Genesis) -> Self {
        let defaults = NodeConfig::default();
        Self {
            params,
            genesis,
            registry: TransactionTypeRegistry::standard(),
            hit: Arc::new(StakeHitVerifier),
            clock: Arc::new(SystemClock),
            events: Arc::new(EventBus::new()),
            derived: Vec::new(),
            max_unconfirmed_transactions: defaults.max_unconfirmed_transactions,
            max_waiting_secs: defaults.max_waiting_secs,
            enable_trimming: defaults.enable_trimming,
            trim_frequency: defaults.trim_frequency,
            block_cache_size: defaults.block_cache_size,
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            max_unconfirmed_transactions: config.max_unconfirmed_transactions,
            max_waiting_secs: config.max_waiting_secs,
            enable_trimming: config.enable_trimming,
            trim_frequency: config.trim_frequency,
            block_cache_size: config.block_cache_size,
            ..Self::new(config.params.clone(), config.genesis.clone())
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_hit_verifier(mut self, hit: Arc<dyn HitVerifier>) -> Self {
        self.hit = hit;
        self
    }

    pub fn with_registry(mut self, registry: TransactionTypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_derived_state(mut self, state: Box<dyn DerivedState>) -> Self {
        self.derived.push(state);
        self
    }
}

/// Mutable chain state, guarded by the chain lock.
pub(crate) struct ChainState {
    pub(crate) last_block: Arc<Block>,
    pub(crate) ledger: Ledger,
    pub(crate) derived: Vec<Box<dyn DerivedState>>,
    pub(crate) pool: UnconfirmedPool,
    pub(crate) last_trim_height: u32,
    /// Events waiting for the lock to be released.
    pending_events: Vec<ChainEvent>,
}

impl ChainState {
    pub(crate) fn defer(&mut self, event: ChainEvent) {
        self.pending_events.push(event);
    }

    /// Queue pool change notifications, removals first.
    pub(crate) fn defer_pool_changes(&mut self, added: Vec<Transaction>, removed: Vec<Transaction>) {
        if !removed.is_empty() {
            self.defer(ChainEvent::RemovedUnconfirmedTransactions(removed));
        }
        if !added.is_empty() {
            self.defer(ChainEvent::AddedUnconfirmedTransactions(added));
        }
    }

    /// Drop events queued since `mark`.
    pub(crate) fn discard_events_since(&mut self, mark: usize) {
        self.pending_events.truncate(mark);
    }

    pub(crate) fn pending_event_count(&self) -> usize {
        self.pending_events.len()
    }

    /// Roll the ledger and every extra view back to `height`.
    pub(crate) fn rollback_derived(&mut self, height: u32) -> Result<(), ChainError> {
        self.ledger.rollback(height)?;
        for state in &mut self.derived {
            state.rollback(height)?;
        }
        Ok(())
    }

    pub(crate) fn truncate_derived(&mut self) {
        self.ledger.truncate();
        for state in &mut self.derived {
            state.truncate();
        }
        self.last_trim_height = 0;
    }
}

pub struct Chain {
    pub(crate) state: RwLock<ChainState>,
    pub(crate) store: Arc<dyn ChainStore>,
    pub(crate) registry: TransactionTypeRegistry,
    pub(crate) hit: Arc<dyn HitVerifier>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) params: ProtocolParams,
    pub(crate) events: Arc<EventBus>,
    pub(crate) cache: Arc<BlockCache>,
    pub(crate) genesis: Arc<Block>,
    genesis_allocations: Vec<(AccountId, u64)>,
    pub(crate) max_waiting_secs: u64,
    enable_trimming: bool,
    trim_frequency: u32,
}

impl Chain {
    /// Open the chain on `store`.
    ///
    /// An empty store receives the genesis block. Otherwise derived state is
    /// rebuilt by a rescan from genesis, re-validating when an interrupted
    /// validating rescan left its record behind.
    pub fn open(store: Arc<dyn ChainStore>, options: ChainOptions) -> Result<Self, ChainError> {
        let genesis = Arc::new(options.genesis.block());
        let cache = Arc::new(BlockCache::new(options.block_cache_size));

        let state = ChainState {
            last_block: Arc::clone(&genesis),
            ledger: Ledger::new(),
            derived: options.derived,
            pool: UnconfirmedPool::new(options.max_unconfirmed_transactions),
            last_trim_height: 0,
            pending_events: Vec::new(),
        };
        let chain = Self {
            state: RwLock::new(state),
            store,
            registry: options.registry,
            hit: options.hit,
            clock: options.clock,
            params: options.params,
            events: options.events,
            cache,
            genesis,
            genesis_allocations: options.genesis.allocations,
            max_waiting_secs: options.max_waiting_secs,
            enable_trimming: options.enable_trimming,
            trim_frequency: options.trim_frequency,
        };

        match chain.store.block_at_height(0)? {
            None => {
                let mut batch = WriteBatch::new();
                batch.put_block((*chain.genesis).clone());
                chain.store.write(batch)?;
                let mut state = chain.write();
                chain.apply_genesis(&mut state)?;
                info!(genesis = %chain.genesis.id(), "wrote genesis block");
            }
            Some(stored) if stored.id() != chain.genesis.id() => {
                return Err(ChainError::ReplayDivergence {
                    height: 0,
                    reason: format!(
                        "stored genesis {} does not match configured genesis {}",
                        stored.id(),
                        chain.genesis.id()
                    ),
                });
            }
            Some(_) => {
                let validate = chain
                    .store
                    .scan_record()?
                    .is_some_and(|record| record.rescan && record.validate);
                let mut state = chain.write();
                chain.scan_locked(&mut state, 0, validate)?;
            }
        }
        Ok(chain)
    }

    /// Reset derived state to just after genesis.
    pub(crate) fn apply_genesis(&self, state: &mut ChainState) -> Result<(), ChainError> {
        state.truncate_derived();
        state.last_trim_height = 0;
        state.ledger.set_height(0);
        for (account, amount) in &self.genesis_allocations {
            state.ledger.credit(*account, *amount)?;
        }
        state.last_block = Arc::clone(&self.genesis);
        Ok(())
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, ChainState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> ChainWriteGuard<'_> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        // Leftovers of a writer that panicked are never published.
        state.pending_events.clear();
        ChainWriteGuard {
            state,
            outbox: Outbox {
                bus: &self.events,
                events: Vec::new(),
            },
        }
    }

    // ── Head ─────────────────────────────────────────────────────────────

    pub fn last_block(&self) -> Arc<Block> {
        Arc::clone(&self.read().last_block)
    }

    pub fn height(&self) -> u32 {
        self.read().last_block.height
    }

    pub fn cumulative_difficulty(&self) -> u128 {
        self.read().last_block.cumulative_difficulty
    }

    pub fn genesis(&self) -> Arc<Block> {
        Arc::clone(&self.genesis)
    }

    /// Lowest height pop-off can reach without a rescan.
    pub fn min_rollback_height(&self) -> u32 {
        let state = self.read();
        self.min_rollback_height_locked(&state)
    }

    pub(crate) fn min_rollback_height_locked(&self, state: &ChainState) -> u32 {
        if self.enable_trimming {
            state.last_trim_height
        } else {
            state
                .last_block
                .height
                .saturating_sub(self.params.max_rollback)
        }
    }

    /// Economic-clustering block new transactions should name.
    pub fn ec_block(&self) -> Result<(u32, BlockId), ChainError> {
        let height = self
            .height()
            .saturating_sub(self.params.ec_block_distance_limit);
        let id = self
            .store
            .block_id_at_height(height)?
            .unwrap_or_else(|| self.genesis.id());
        Ok((height, id))
    }

    // ── Blocks and transactions ──────────────────────────────────────────

    /// Look a block up through the cache. The shared lock is held across the
    /// store read and the cache fill so a concurrent pop-off cannot leave a
    /// removed block cached.
    pub fn block(&self, id: BlockId) -> Result<Option<Arc<Block>>, ChainError> {
        let _state = self.read();
        if let Some(block) = self.cache.get(id) {
            return Ok(Some(block));
        }
        let Some(block) = self.store.block(id)? else {
            return Ok(None);
        };
        let block = Arc::new(block);
        self.cache.insert(Arc::clone(&block));
        Ok(Some(block))
    }

    pub fn has_block(&self, id: BlockId) -> Result<bool, ChainError> {
        let _state = self.read();
        if self.cache.get(id).is_some() {
            return Ok(true);
        }
        Ok(self.store.has_block(id)?)
    }

    pub fn block_at_height(&self, height: u32) -> Result<Option<Block>, ChainError> {
        Ok(self.store.block_at_height(height)?)
    }

    pub fn block_id_at_height(&self, height: u32) -> Result<Option<BlockId>, ChainError> {
        Ok(self.store.block_id_at_height(height)?)
    }

    pub fn block_ids_after(&self, id: BlockId, limit: usize) -> Result<Vec<BlockId>, ChainError> {
        Ok(self.store.block_ids_after(id, limit)?)
    }

    pub fn blocks_after(&self, id: BlockId, limit: usize) -> Result<Vec<Block>, ChainError> {
        Ok(self.store.blocks_after(id, limit)?)
    }

    pub fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, ChainError> {
        Ok(self.store.transaction(id)?)
    }

    pub fn transaction_height(&self, id: TransactionId) -> Result<Option<u32>, ChainError> {
        Ok(self.store.transaction_height(id)?)
    }

    // ── Derived state ────────────────────────────────────────────────────

    pub fn balance(&self, account: AccountId) -> u64 {
        self.read().ledger.balance(account)
    }

    pub fn unconfirmed_balance(&self, account: AccountId) -> u64 {
        self.read().ledger.unconfirmed_balance(account)
    }

    pub fn balance_at(&self, account: AccountId, height: u32) -> u64 {
        self.read().ledger.balance_at(account, height)
    }

    pub fn alias(&self, name: &str) -> Option<Alias> {
        self.read().ledger.alias(name).cloned()
    }

    pub fn account_info(&self, account: AccountId) -> Option<AccountInfo> {
        self.read().ledger.account_info(account).cloned()
    }

    pub fn poll(&self, full_hash: &TxHash) -> Option<PhasingPoll> {
        self.read().ledger.poll(full_hash).cloned()
    }

    /// Run `f` against a consistent view of the ledger.
    pub fn with_ledger<R>(&self, f: impl FnOnce(&Ledger) -> R) -> R {
        f(&self.read().ledger)
    }

    // ── Pool views ───────────────────────────────────────────────────────

    /// Admitted transactions, highest priority first.
    pub fn unconfirmed_transactions(&self) -> Vec<Transaction> {
        self.read()
            .pool
            .admitted()
            .map(|entry| entry.transaction.clone())
            .collect()
    }

    pub fn unconfirmed_transaction_ids(&self) -> Vec<TransactionId> {
        self.read().pool.admitted().map(|entry| entry.id()).collect()
    }

    pub fn waiting_transactions(&self) -> Vec<Transaction> {
        self.read()
            .pool
            .waiting()
            .map(|entry| entry.transaction.clone())
            .collect()
    }

    pub fn is_admitted(&self, id: TransactionId) -> bool {
        self.read().pool.is_admitted(id)
    }

    /// `(admitted, waiting)` counts.
    pub fn pool_sizes(&self) -> (usize, usize) {
        let state = self.read();
        (state.pool.admitted_len(), state.pool.waiting_len())
    }

    pub fn broadcasted_transactions(&self) -> Vec<Transaction> {
        self.read().pool.broadcasted()
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn ChainStore> {
        &self.store
    }

    pub fn registry(&self) -> &TransactionTypeRegistry {
        &self.registry
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ── Trimming ─────────────────────────────────────────────────────────

    /// Drop derived-state history below the rollback window. Returns the new
    /// trim height when a trim ran.
    pub fn trim(&self) -> Option<u32> {
        if !self.enable_trimming {
            return None;
        }
        let mut state = self.write();
        let height = state.last_block.height;
        let target = height.saturating_sub(self.params.max_rollback);
        if target < state.last_trim_height.saturating_add(self.trim_frequency) {
            return None;
        }
        state.ledger.trim(target);
        for derived in &mut state.derived {
            derived.trim(target);
        }
        state.last_trim_height = target;
        info!(height, trimmed_to = target, "trimmed derived state");
        Some(target)
    }
}

/// Exclusive access to [`ChainState`].
///
/// Dropping the guard moves the queued events out while the lock is still
/// held, releases the lock, then publishes them in order. Fields drop in
/// declaration order, so `state` unlocks before `outbox` publishes.
pub(crate) struct ChainWriteGuard<'a> {
    state: RwLockWriteGuard<'a, ChainState>,
    outbox: Outbox<'a>,
}

struct Outbox<'a> {
    bus: &'a EventBus,
    events: Vec<ChainEvent>,
}

impl Deref for ChainWriteGuard<'_> {
    type Target = ChainState;

    fn deref(&self) -> &ChainState {
        &self.state
    }
}

impl DerefMut for ChainWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut ChainState {
        &mut self.state
    }
}

impl Drop for ChainWriteGuard<'_> {
    fn drop(&mut self) {
        self.outbox.events = std::mem::take(&mut self.state.pending_events);
    }
}

impl Drop for Outbox<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        for event in self.events.drain(..) {
            self.bus.publish(event);
        }
    }
}
