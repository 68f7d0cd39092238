//! Pop-off and rescan.
//!
//! Pop-off deletes the blocks above a target height in one store batch and
//! rolls derived state back. Below the retained history it falls back to a
//! rescan from genesis. A rescan replays stored blocks through the same
//! apply path as acceptance; a block that no longer applies is deleted
//! together with everything above it, and the loop retries from a lower
//! height until the stored chain replays cleanly.

use std::sync::Arc;

use tracing::{error, info, warn};

use strata_ledger::Block;
use strata_store::{ScanRecord, WriteBatch};

use crate::acceptor::ApplyMode;
use crate::chain::{Chain, ChainState};
use crate::error::{BlockRejection, ChainError};
use crate::events::ChainEvent;
use crate::pool::UnconfirmedTransaction;
use crate::tracing_spans::{pop_off_span, rescan_span};

/// Rescan restarts allowed before giving up. Every restart deletes at least
/// one stored block, so this only bounds pathological corruption.
const MAX_SCAN_ATTEMPTS: u32 = 16;

/// Blocks read from the store per batch during a rescan.
const SCAN_BATCH: usize = 256;

impl Chain {
    /// Detach every block above `height`. Returns the detached blocks in
    /// ascending height order; their transactions are queued for
    /// re-admission.
    pub fn pop_off_to(&self, height: u32) -> Result<Vec<Arc<Block>>, ChainError> {
        let mut state = self.write();
        self.pop_off_locked(&mut state, height)
    }

    pub(crate) fn pop_off_locked(
        &self,
        state: &mut ChainState,
        height: u32,
    ) -> Result<Vec<Arc<Block>>, ChainError> {
        let head_height = state.last_block.height;
        if height >= head_height {
            return Ok(Vec::new());
        }
        let span = pop_off_span(head_height, height);
        let _enter = span.enter();

        let popped: Vec<Arc<Block>> = self
            .store
            .blocks_from_height(height + 1, (head_height - height) as usize)?
            .into_iter()
            .map(Arc::new)
            .collect();

        let requeued = self.requeue_locked(state)?;
        let mut batch = WriteBatch::new();
        batch.delete_blocks_from(height + 1);
        self.store.write(batch)?;
        self.cache.clear();

        let below_history = height < self.min_rollback_height_locked(state);
        let rolled_back = !below_history && state.rollback_derived(height).is_ok();
        if rolled_back {
            state.last_block = match self.store.block_at_height(height)? {
                Some(block) => Arc::new(block),
                None => {
                    return Err(ChainError::ReplayDivergence {
                        height,
                        reason: "no stored block at pop-off target".into(),
                    })
                }
            };
        } else {
            info!(height, "pop-off below retained history, rescanning");
            self.scan_locked(state, 0, false)?;
        }
        state.defer_pool_changes(Vec::new(), requeued);

        for block in popped.iter().rev() {
            state.defer(ChainEvent::BlockPopped(Arc::clone(block)));
        }
        for block in &popped {
            for tx in &block.transactions {
                let entry = UnconfirmedTransaction::new(tx.clone(), block.timestamp, block.height);
                state.pool.push_waiting(entry);
            }
        }
        info!(from = head_height, to = state.last_block.height, "popped off blocks");
        Ok(popped)
    }

    /// Replay stored blocks from `from_height`, optionally re-checking
    /// signatures and ids.
    pub fn rescan(&self, from_height: u32, validate: bool) -> Result<(), ChainError> {
        let mut state = self.write();
        self.scan_locked(&mut state, from_height, validate)
    }

    pub(crate) fn scan_locked(
        &self,
        state: &mut ChainState,
        from_height: u32,
        validate: bool,
    ) -> Result<(), ChainError> {
        let span = rescan_span(from_height, validate);
        let _enter = span.enter();

        let mut batch = WriteBatch::new();
        batch.put_scan_record(ScanRecord::pending(from_height, validate));
        self.store.write(batch)?;
        self.cache.clear();
        let requeued = self.requeue_locked(state)?;
        state.defer_pool_changes(Vec::new(), requeued);
        state.defer(ChainEvent::RescanBegin { from_height });
        info!(from_height, validate, "rescan started");

        let mut from = from_height.max(1);
        for attempt in 0..MAX_SCAN_ATTEMPTS {
            self.reset_to(state, from)?;
            from = state.last_block.height + 1;
            match self.replay_from(state, from, validate) {
                Ok(()) => {
                    let mut batch = WriteBatch::new();
                    batch.clear_scan_record();
                    self.store.write(batch)?;
                    let height = state.last_block.height;
                    state.defer(ChainEvent::RescanEnd { height });
                    info!(height, "rescan finished");
                    return Ok(());
                }
                Err((height, e)) => {
                    warn!(height, attempt, error = %e, "stored block failed replay, deleting");
                    let mut batch = WriteBatch::new();
                    batch.delete_blocks_from(height);
                    self.store.write(batch)?;
                    self.cache.clear();
                    // The failed block's partial effects are rolled back by
                    // the next reset.
                    from = height;
                }
            }
        }
        error!(from_height, "rescan did not converge");
        Err(ChainError::ReplayDivergence {
            height: from,
            reason: format!("no clean replay after {MAX_SCAN_ATTEMPTS} attempts"),
        })
    }

    /// Reset derived state and the head to just below `from`. Falls back
    /// to genesis when history is not available.
    fn reset_to(&self, state: &mut ChainState, from: u32) -> Result<(), ChainError> {
        let target = from.saturating_sub(1);
        if target > 0 && target >= self.min_rollback_height_locked(state) {
            if let Some(block) = self.store.block_at_height(target)? {
                if state.rollback_derived(target).is_ok() {
                    state.last_block = Arc::new(block);
                    return Ok(());
                }
            }
        }
        self.apply_genesis(state)
    }

    /// Apply stored blocks above the head. On failure returns the height of
    /// the offending block; the head stays at the last good block.
    fn replay_from(
        &self,
        state: &mut ChainState,
        from: u32,
        validate: bool,
    ) -> Result<(), (u32, ChainError)> {
        let mode = ApplyMode::Scan { validate };
        let mut next = from;
        loop {
            let blocks = self
                .store
                .blocks_from_height(next, SCAN_BATCH)
                .map_err(|e| (next, ChainError::from(e)))?;
            if blocks.is_empty() {
                return Ok(());
            }
            for block in blocks {
                let height = block.height;
                self.replay_block(state, block, mode)
                    .map_err(|e| (height, e))?;
                next = height + 1;
            }
        }
    }

    fn replay_block(
        &self,
        state: &mut ChainState,
        block: Block,
        mode: ApplyMode,
    ) -> Result<(), ChainError> {
        let previous = Arc::clone(&state.last_block);
        let stored_height = block.height;
        let stored_difficulty = block.cumulative_difficulty;
        let mut block = block;
        self.validate_header(state, &block, &previous, mode)?;
        block.link_to(&previous);
        if block.height != stored_height || block.cumulative_difficulty != stored_difficulty {
            return Err(ChainError::block(block.id(), BlockRejection::IdMismatch));
        }
        if mode == (ApplyMode::Scan { validate: true })
            && self.store.block_id_at_height(stored_height)? != Some(block.id())
        {
            return Err(ChainError::block(block.id(), BlockRejection::IdMismatch));
        }
        let block = Arc::new(block);
        let mark = state.pending_event_count();
        if let Err(e) = self.apply_block(state, &block, &previous, mode) {
            state.discard_events_since(mark);
            return Err(e);
        }
        state.last_block = Arc::clone(&block);
        state.defer(ChainEvent::BlockScanned(block));
        Ok(())
    }
}
