//! Local block production.

use std::sync::Arc;

use tracing::{debug, info};

use strata_ledger::{Block, DuplicateKeys};
use strata_transactions::Transaction;
use strata_types::{KeyPair, Timestamp};

use crate::chain::{Chain, ChainState};
use crate::error::{BlockRejection, ChainError};
use crate::events::ChainEvent;

/// Transactions dropped and retried before block production gives up.
const MAX_GENERATION_ATTEMPTS: usize = 8;

impl Chain {
    /// Build, sign and push a block on the current head.
    ///
    /// A transaction that makes the block fail is dropped from the pool and
    /// the block is rebuilt without it.
    pub fn generate_block(
        &self,
        keypair: &KeyPair,
        timestamp: Timestamp,
    ) -> Result<Arc<Block>, ChainError> {
        let mut state = self.write();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let added = self.drain_waiting_locked(&mut state)?;
            state.defer_pool_changes(added, Vec::new());

            let previous = Arc::clone(&state.last_block);
            let transactions = self.select_transactions(&state, timestamp)?;
            let block = Block::assemble(
                self.params.block_version_at(previous.height + 1),
                &previous,
                timestamp,
                transactions,
                keypair,
                self.hit.generation_signature(&previous, &keypair.public),
                self.hit.next_base_target(&previous, timestamp),
            )
            .ok_or_else(|| ChainError::block(previous.id(), BlockRejection::TotalsMismatch))?;

            match self.push_locked(&mut state, block) {
                Ok(block) => {
                    state.defer(ChainEvent::BlockGenerated(Arc::clone(&block)));
                    info!(
                        height = block.height,
                        block = %block.id(),
                        transactions = block.transactions.len(),
                        "generated block"
                    );
                    return Ok(block);
                }
                Err(e) if attempt < MAX_GENERATION_ATTEMPTS => {
                    let Some(id) = e.rejected_transaction() else {
                        return Err(e);
                    };
                    debug!(transaction = %id, error = %e, "dropping transaction from generated block");
                    if let Some(entry) = self.unadmit_locked(&mut state, id)? {
                        state.defer_pool_changes(Vec::new(), vec![entry.transaction]);
                    }
                    state.pool.remove_waiting(id);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Admitted transactions that fit in a block stamped `timestamp`,
    /// highest priority first.
    pub(crate) fn select_transactions(
        &self,
        state: &ChainState,
        timestamp: Timestamp,
    ) -> Result<Vec<Transaction>, ChainError> {
        let max_count = self.params.max_transactions_per_block as usize;
        let max_payload = self.params.max_payload_length as usize;
        let mut duplicates = DuplicateKeys::new();
        let mut payload = 0usize;
        let mut selected = Vec::new();

        for entry in state.pool.admitted() {
            if selected.len() >= max_count {
                break;
            }
            let tx = &entry.transaction;
            if tx.expiration() < timestamp
                || tx.timestamp > timestamp.plus_secs(self.params.max_timedrift_secs)
            {
                continue;
            }
            let size = tx.size();
            if payload + size > max_payload {
                continue;
            }
            if let Some(full_hash) = &tx.referenced_transaction_full_hash {
                if self.store.transaction_height_by_full_hash(full_hash)?.is_none() {
                    continue;
                }
            }
            let Ok(kind) = self.registry.kind_of(tx) else {
                continue;
            };
            if kind.is_duplicate(tx, &mut duplicates) {
                continue;
            }
            payload += size;
            selected.push(tx.clone());
        }
        Ok(selected)
    }
}
