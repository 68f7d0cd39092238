//! Block acceptance: validate a block against the head and apply it
//! atomically.
//!
//! A push first checks the header without touching any state. It then
//! requeues the pool, applies the block to the ledger at the new height and
//! writes it to the store in one batch. If anything fails after the header
//! checks, the ledger and every extra view are rolled back to the previous
//! height and the pool is restored from a snapshot. The head is unchanged.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use strata_crypto::account_id;
use strata_ledger::block::PayloadTotals;
use strata_ledger::{Block, DuplicateKeys, LedgerError, PhasingPoll};
use strata_store::WriteBatch;
use strata_transactions::{validate_transaction, Transaction, TransactionError};
use strata_types::TransactionId;

use crate::chain::{Chain, ChainState};
use crate::error::{BlockRejection, ChainError};
use crate::events::ChainEvent;
use crate::pool::UnconfirmedPool;
use crate::tracing_spans::block_push_span;

/// How much of the block to re-check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ApplyMode {
    /// A new block: every check runs.
    Accept,
    /// A stored block being replayed. Without `validate` only linkage is
    /// checked before the block is applied.
    Scan { validate: bool },
}

impl ApplyMode {
    fn full_checks(self) -> bool {
        matches!(self, Self::Accept | Self::Scan { validate: true })
    }
}

impl Chain {
    /// Validate `block` against the head and append it.
    ///
    /// Returns the block with its height and cumulative difficulty filled in.
    /// On error nothing observable has changed.
    pub fn push_block(&self, block: Block) -> Result<Arc<Block>, ChainError> {
        let mut state = self.write();
        self.push_locked(&mut state, block)
    }

    pub(crate) fn push_locked(
        &self,
        state: &mut ChainState,
        mut block: Block,
    ) -> Result<Arc<Block>, ChainError> {
        let previous = Arc::clone(&state.last_block);
        let id = block.id();
        let span = block_push_span(id, previous.height + 1);
        let _enter = span.enter();

        self.validate_header(state, &block, &previous, ApplyMode::Accept)?;
        block.link_to(&previous);
        let block = Arc::new(block);
        state.defer(ChainEvent::BeforeBlockAccept(Arc::clone(&block)));
        let mark = state.pending_event_count();

        let snapshot = state.pool.clone();
        let result = self
            .requeue_locked(state)
            .and_then(|requeued| {
                self.apply_block(state, &block, &previous, ApplyMode::Accept)?;
                let mut batch = WriteBatch::new();
                batch.put_block((*block).clone());
                self.store.write(batch)?;
                Ok(requeued)
            });
        let requeued = match result {
            Ok(requeued) => requeued,
            Err(e) => {
                state.discard_events_since(mark);
                self.restore_after_failed_push(state, previous.height, snapshot)?;
                debug!(block = %id, error = %e, "block refused");
                return Err(e);
            }
        };

        state.last_block = Arc::clone(&block);
        state.pool.forget(&block.transaction_ids());
        self.cache.insert(Arc::clone(&block));

        state.defer_pool_changes(Vec::new(), requeued);
        state.defer(ChainEvent::AfterBlockAccept(Arc::clone(&block)));
        state.defer(ChainEvent::BlockPushed(Arc::clone(&block)));
        if !block.transactions.is_empty() {
            state.defer(ChainEvent::AddedConfirmedTransactions(
                block.transactions.clone(),
            ));
        }
        info!(
            height = block.height,
            block = %id,
            transactions = block.transactions.len(),
            "block pushed"
        );
        Ok(block)
    }

    /// Put the ledger, extra views and pool back to where they were before a
    /// failed push. The pool's reservations were made at `height` and are
    /// replayed against the rolled-back ledger.
    fn restore_after_failed_push(
        &self,
        state: &mut ChainState,
        height: u32,
        snapshot: UnconfirmedPool,
    ) -> Result<(), ChainError> {
        state.rollback_derived(height)?;
        for entry in snapshot.admitted() {
            let tx = &entry.transaction;
            let kind = self
                .registry
                .kind_of(tx)
                .map_err(|e| ChainError::transaction(entry.id(), e))?;
            if !kind.apply_unconfirmed(tx, &mut state.ledger) {
                return Err(ChainError::Ledger(LedgerError::InsufficientBalance {
                    account: tx.sender(),
                }));
            }
        }
        state.pool = snapshot;
        Ok(())
    }

    /// Checks that need nothing but the block and its parent.
    pub(crate) fn validate_header(
        &self,
        state: &ChainState,
        block: &Block,
        previous: &Block,
        mode: ApplyMode,
    ) -> Result<(), ChainError> {
        let id = block.id();
        let reject = |reason| Err(ChainError::block(id, reason));

        if mode == ApplyMode::Accept && self.store.has_block(id)? {
            return reject(BlockRejection::Duplicate);
        }
        if block.previous_block_id != previous.id() {
            return reject(BlockRejection::NotLinked {
                previous: block.previous_block_id,
                head: previous.id(),
            });
        }
        if id.is_zero() {
            return reject(BlockRejection::ZeroId);
        }
        if !mode.full_checks() {
            return Ok(());
        }

        let height = previous.height + 1;
        let expected = self.params.block_version_at(height);
        if block.version != expected {
            return reject(BlockRejection::BadVersion {
                expected,
                found: block.version,
            });
        }
        if block.timestamp <= previous.timestamp {
            return reject(BlockRejection::TimestampNotAfterParent);
        }
        if mode == ApplyMode::Accept
            && block.timestamp > self.clock.now().plus_secs(self.params.max_timedrift_secs)
        {
            return reject(BlockRejection::TimestampInFuture {
                timestamp: block.timestamp,
            });
        }
        if block.previous_block_hash != previous.hash() {
            return reject(BlockRejection::PreviousHashMismatch);
        }
        if block.transactions.len() > self.params.max_transactions_per_block as usize {
            return reject(BlockRejection::TooManyTransactions {
                count: block.transactions.len(),
                max: self.params.max_transactions_per_block,
            });
        }
        if block.payload_length > self.params.max_payload_length {
            return reject(BlockRejection::PayloadTooLong {
                length: block.payload_length,
                max: self.params.max_payload_length,
            });
        }
        if !self.hit.verify_generation_signature(block, previous) {
            return reject(BlockRejection::BadGenerationSignature);
        }
        if !block.verify_block_signature() {
            return reject(BlockRejection::BadBlockSignature);
        }
        if block.base_target != self.hit.next_base_target(previous, block.timestamp) {
            return reject(BlockRejection::BaseTargetMismatch);
        }

        let generator = account_id(&block.generator_public_key);
        let balance = state.ledger.balance_at(generator, previous.height);
        match self
            .hit
            .earliest_timestamp(previous, &block.generator_public_key, balance)
        {
            None => reject(BlockRejection::ProducerIneligible),
            Some(earliest) if block.timestamp < earliest => {
                reject(BlockRejection::BeforeProducerSlot { earliest })
            }
            Some(_) => Ok(()),
        }
    }

    /// Validate the block's transactions and apply everything at
    /// `block.height`. The caller rolls back on error.
    pub(crate) fn apply_block(
        &self,
        state: &mut ChainState,
        block: &Arc<Block>,
        previous: &Block,
        mode: ApplyMode,
    ) -> Result<(), ChainError> {
        let height = block.height;
        if mode.full_checks() {
            self.validate_transactions(state, block, previous.height, mode)?;
        } else {
            let mut seen = HashSet::new();
            for tx in &block.transactions {
                if !seen.insert(tx.id()) {
                    return Err(ChainError::block(
                        block.id(),
                        BlockRejection::RepeatedTransaction(tx.id()),
                    ));
                }
            }
        }

        state.ledger.set_height(height);
        for tx in &block.transactions {
            let kind = self
                .registry
                .kind_of(tx)
                .map_err(|e| ChainError::transaction(tx.id(), e))?;
            if !kind.apply_unconfirmed(tx, &mut state.ledger) {
                return Err(ChainError::transaction(
                    tx.id(),
                    TransactionError::InsufficientFunds,
                ));
            }
        }

        state.defer(ChainEvent::BeforeBlockApply(Arc::clone(block)));
        state
            .ledger
            .credit(account_id(&block.generator_public_key), block.total_fee)?;
        for poll in state.ledger.polls_finishing_at(height) {
            self.finish_poll(state, &poll)?;
        }
        for tx in &block.transactions {
            let kind = self
                .registry
                .kind_of(tx)
                .map_err(|e| ChainError::transaction(tx.id(), e))?;
            kind.apply(tx, &mut state.ledger)
                .map_err(|e| apply_error(tx.id(), e))?;
        }
        for poll in state.ledger.polls_with_quorum() {
            self.release_early(state, &poll)?;
        }
        state.defer(ChainEvent::AfterBlockApply(Arc::clone(block)));
        Ok(())
    }

    fn validate_transactions(
        &self,
        state: &ChainState,
        block: &Block,
        parent_height: u32,
        mode: ApplyMode,
    ) -> Result<(), ChainError> {
        let height = parent_height + 1;
        let mut seen = HashSet::new();
        let mut duplicates = DuplicateKeys::new();
        for tx in &block.transactions {
            let tx_id = tx.id();
            let fail = |e| Err(ChainError::transaction(tx_id, e));
            if !seen.insert(tx_id) {
                return Err(ChainError::block(
                    block.id(),
                    BlockRejection::RepeatedTransaction(tx_id),
                ));
            }
            if let Err(e) = validate_transaction(tx, &self.params, block.timestamp, true) {
                return fail(e);
            }
            if self.confirmed_below(tx_id, height, mode)? {
                return fail(TransactionError::AlreadyConfirmed);
            }
            if let Some(full_hash) = &tx.referenced_transaction_full_hash {
                let confirmed = self
                    .store
                    .transaction_height_by_full_hash(full_hash)?
                    .is_some_and(|h| h < height);
                if !confirmed {
                    return fail(TransactionError::MissingReference(*full_hash));
                }
            }
            if let Err(e) = self.check_ec_block(tx, parent_height) {
                return fail(e);
            }
            if let Err(e) = self
                .registry
                .validate(tx, &state.ledger, &self.params, height)
            {
                return fail(e);
            }
            let kind = self
                .registry
                .kind_of(tx)
                .map_err(|e| ChainError::transaction(tx_id, e))?;
            if kind.is_duplicate(tx, &mut duplicates) {
                let key = kind.duplicate_key(tx).map(|k| k.to_string()).unwrap_or_default();
                return fail(TransactionError::DuplicateKey { key });
            }
        }

        let totals = PayloadTotals::compute(&block.transactions)
            .ok_or_else(|| ChainError::block(block.id(), BlockRejection::TotalsMismatch))?;
        if totals.total_amount != block.total_amount
            || totals.total_fee != block.total_fee
            || totals.payload_length != block.payload_length
            || totals.payload_hash != block.payload_hash
        {
            return Err(ChainError::block(block.id(), BlockRejection::TotalsMismatch));
        }
        Ok(())
    }

    /// Whether `id` is already on the chain below `height`. A replayed block's
    /// own transactions are stored at its height and do not count.
    fn confirmed_below(
        &self,
        id: TransactionId,
        height: u32,
        mode: ApplyMode,
    ) -> Result<bool, ChainError> {
        let stored = self.store.transaction_height(id)?;
        Ok(match mode {
            ApplyMode::Accept => stored.is_some(),
            ApplyMode::Scan { .. } => stored.is_some_and(|h| h < height),
        })
    }

    /// The EC block must be on our chain at or below `head_height`.
    pub(crate) fn check_ec_block(
        &self,
        tx: &Transaction,
        head_height: u32,
    ) -> Result<(), TransactionError> {
        let mismatch = TransactionError::EcBlockMismatch {
            height: tx.ec_block_height,
        };
        if tx.ec_block_height > head_height {
            return Err(mismatch);
        }
        match self.store.block_id_at_height(tx.ec_block_height) {
            Ok(Some(id)) if id == tx.ec_block_id => Ok(()),
            Ok(_) => Err(mismatch),
            Err(e) => Err(TransactionError::NotCurrentlyValid(e.to_string())),
        }
    }

    /// Resolve a poll at its finish height: release the transaction if it
    /// was approved and is still valid, otherwise return its amount.
    fn finish_poll(&self, state: &mut ChainState, poll: &PhasingPoll) -> Result<(), ChainError> {
        let tx = &poll.transaction;
        let kind = self
            .registry
            .kind_of(tx)
            .map_err(|e| ChainError::transaction(tx.id(), e))?;
        let valid = kind.validate(tx, &state.ledger, &self.params).is_ok();
        if poll.approved() && valid {
            kind.release_phased(tx, &mut state.ledger)
                .map_err(|e| apply_error(tx.id(), e))?;
            state.defer(ChainEvent::ReleasePhasedTransaction(tx.clone()));
        } else {
            kind.reject_phased(tx, &mut state.ledger)?;
            debug!(transaction = %tx.id(), approved = poll.approved(), "phased transaction rejected");
        }
        state.ledger.resolve_poll(&tx.full_hash())?;
        Ok(())
    }

    /// Release a poll whose quorum was reached before its finish height.
    fn release_early(&self, state: &mut ChainState, poll: &PhasingPoll) -> Result<(), ChainError> {
        let tx = &poll.transaction;
        let kind = self
            .registry
            .kind_of(tx)
            .map_err(|e| ChainError::transaction(tx.id(), e))?;
        if kind.validate(tx, &state.ledger, &self.params).is_err() {
            return Ok(());
        }
        kind.release_phased(tx, &mut state.ledger)
            .map_err(|e| apply_error(tx.id(), e))?;
        state.ledger.resolve_poll(&tx.full_hash())?;
        state.defer(ChainEvent::ReleasePhasedTransaction(tx.clone()));
        Ok(())
    }

    pub(crate) fn log_rejection(&self, source: &str, error: &ChainError) {
        if error.is_peer_fault() {
            warn!(source, error = %error, "block rejected");
        } else {
            debug!(source, error = %error, "block not applied");
        }
    }
}

fn apply_error(id: TransactionId, error: LedgerError) -> ChainError {
    match error {
        LedgerError::InsufficientBalance { .. } => {
            ChainError::transaction(id, TransactionError::InsufficientFunds)
        }
        other => ChainError::Ledger(other),
    }
}
