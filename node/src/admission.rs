//! Pool admission, expiry, requeue and drain.
//!
//! Admission reserves the sender's funds in the ledger at the current head
//! height. Before the head moves, every reservation is released again by a
//! requeue, so the ledger never carries a reservation across a height.

use tracing::{debug, warn};

use strata_transactions::{validate_transaction, Transaction, TransactionError};
use strata_types::{Timestamp, TransactionId};

use crate::chain::{Chain, ChainState};
use crate::error::ChainError;
use crate::events::ChainEvent;
use crate::pool::UnconfirmedTransaction;

/// What happened to one transaction offered by a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerTransactionOutcome {
    Admitted,
    /// Not admissible yet; kept in the waiting queue.
    Waiting(TransactionError),
    Dropped(TransactionError),
}

impl Chain {
    /// Admit a locally submitted transaction and flag it for rebroadcast.
    ///
    /// A transaction already in the pool is not admitted twice; it is only
    /// flagged for rebroadcast and reported as already admitted.
    pub fn broadcast(&self, tx: Transaction) -> Result<(), ChainError> {
        let mut state = self.write();
        let id = tx.id();
        if state.pool.is_admitted(id) {
            state.pool.mark_broadcasted(id);
            return Err(ChainError::transaction(id, TransactionError::AlreadyAdmitted));
        }
        let height = state.last_block.height;
        let entry = UnconfirmedTransaction::new(tx, self.clock.now(), height);
        let admitted = self
            .admit_locked(&mut state, entry)
            .map_err(|e| ChainError::transaction(id, e))?;
        state.pool.mark_broadcasted(id);
        state.defer(ChainEvent::AddedUnconfirmedTransactions(vec![admitted]));
        Ok(())
    }

    /// Offer transactions received from a peer. Not-currently-valid ones
    /// wait for a later drain; permanently invalid ones are dropped.
    pub fn process_peer_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Vec<(TransactionId, PeerTransactionOutcome)> {
        let mut state = self.write();
        let now = self.clock.now();
        let height = state.last_block.height;
        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut outcomes = Vec::with_capacity(transactions.len());
        for tx in transactions {
            let id = tx.id();
            if state.pool.contains(id) {
                continue;
            }
            let entry = UnconfirmedTransaction::new(tx, now, height);
            let outcome = match self.admit_locked(&mut state, entry.clone()) {
                Ok(tx) => {
                    added.push(tx);
                    PeerTransactionOutcome::Admitted
                }
                Err(e) if e.is_permanent() => PeerTransactionOutcome::Dropped(e),
                Err(e) => {
                    if let Some(evicted) = state.pool.push_waiting(entry) {
                        removed.push(evicted.transaction);
                    }
                    PeerTransactionOutcome::Waiting(e)
                }
            };
            debug!(transaction = %id, ?outcome, "peer transaction");
            outcomes.push((id, outcome));
        }
        state.defer_pool_changes(added, removed);
        outcomes
    }

    /// Admission checks, reservation and insertion. On error nothing changed.
    ///
    /// When the table is full the new entry displaces the lowest-priority
    /// admitted one if it outranks it; the displaced entry moves to the
    /// waiting queue and a removal is queued for it.
    pub(crate) fn admit_locked(
        &self,
        state: &mut ChainState,
        entry: UnconfirmedTransaction,
    ) -> Result<Transaction, TransactionError> {
        let tx = &entry.transaction;
        let id = entry.id();
        if state.pool.is_admitted(id) {
            return Err(TransactionError::AlreadyAdmitted);
        }
        if self
            .store
            .has_transaction(id)
            .map_err(|e| TransactionError::NotCurrentlyValid(e.to_string()))?
        {
            return Err(TransactionError::AlreadyConfirmed);
        }
        validate_transaction(tx, &self.params, self.clock.now(), true)?;
        let head_height = state.last_block.height;
        self.check_ec_block(tx, head_height)?;
        self.registry
            .validate(tx, &state.ledger, &self.params, head_height + 1)?;

        if state.pool.is_full() {
            match state.pool.lowest_admitted() {
                Some(lowest) if entry.priority() > lowest => {}
                _ => return Err(TransactionError::PoolFull),
            }
        }

        let kind = self.registry.kind_of(tx)?;
        if kind.is_duplicate(tx, &mut state.pool.duplicates) {
            let key = kind.duplicate_key(tx).map(|k| k.to_string()).unwrap_or_default();
            return Err(TransactionError::DuplicateKey { key });
        }
        if !kind.apply_unconfirmed(tx, &mut state.ledger) {
            if let Some(key) = kind.duplicate_key(tx) {
                state.pool.duplicates.release(&key);
            }
            return Err(TransactionError::InsufficientFunds);
        }

        if state.pool.is_full() {
            if let Some(lowest) = state.pool.lowest_admitted() {
                match self.unadmit_locked(state, lowest.id) {
                    Ok(Some(evicted)) => {
                        debug!(transaction = %evicted.id(), "evicted from the admitted table");
                        state.defer_pool_changes(Vec::new(), vec![evicted.transaction.clone()]);
                        state.pool.push_waiting(evicted);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // Give back what the newcomer reserved above.
                        if let Err(undo) = kind.undo_unconfirmed(tx, &mut state.ledger) {
                            warn!(transaction = %id, error = %undo, "could not release reservation");
                        }
                        if let Some(key) = kind.duplicate_key(tx) {
                            state.pool.duplicates.release(&key);
                        }
                        return Err(TransactionError::NotCurrentlyValid(e.to_string()));
                    }
                }
            }
        }
        let admitted = entry.transaction.clone();
        state.pool.remove_waiting(id);
        state.pool.insert_admitted(entry);
        Ok(admitted)
    }

    /// Remove an admitted transaction and release its reservation.
    pub(crate) fn unadmit_locked(
        &self,
        state: &mut ChainState,
        id: TransactionId,
    ) -> Result<Option<UnconfirmedTransaction>, ChainError> {
        let Some(entry) = state.pool.remove_admitted(id) else {
            return Ok(None);
        };
        let kind = self
            .registry
            .kind_of(&entry.transaction)
            .map_err(|e| ChainError::transaction(id, e))?;
        kind.undo_unconfirmed(&entry.transaction, &mut state.ledger)?;
        if let Some(key) = kind.duplicate_key(&entry.transaction) {
            state.pool.duplicates.release(&key);
        }
        Ok(Some(entry))
    }

    /// Release every reservation and move the admitted table into the
    /// waiting queue. Returns the requeued transactions.
    pub(crate) fn requeue_locked(
        &self,
        state: &mut ChainState,
    ) -> Result<Vec<Transaction>, ChainError> {
        let entries = state.pool.take_admitted();
        let mut requeued = Vec::with_capacity(entries.len());
        for entry in entries {
            let tx = &entry.transaction;
            let kind = self
                .registry
                .kind_of(tx)
                .map_err(|e| ChainError::transaction(entry.id(), e))?;
            kind.undo_unconfirmed(tx, &mut state.ledger)?;
            requeued.push(tx.clone());
            state.pool.push_waiting(entry);
        }
        state.pool.duplicates.clear();
        Ok(requeued)
    }

    /// Move every admitted transaction back to the waiting queue.
    pub fn requeue_all(&self) -> Result<usize, ChainError> {
        let mut state = self.write();
        let requeued = self.requeue_locked(&mut state)?;
        let count = requeued.len();
        state.defer_pool_changes(Vec::new(), requeued);
        Ok(count)
    }

    /// Remove expired transactions from both stores. Returns how many went.
    pub fn sweep_expired(&self) -> Result<usize, ChainError> {
        let mut state = self.write();
        let now = self.clock.now();
        let expired: Vec<TransactionId> = state
            .pool
            .admitted()
            .filter(|entry| entry.transaction.expiration() < now)
            .map(UnconfirmedTransaction::id)
            .collect();
        let mut removed = Vec::new();
        for id in expired {
            if let Some(entry) = self.unadmit_locked(&mut state, id)? {
                removed.push(entry.transaction);
            }
        }
        let stale: Vec<TransactionId> = state
            .pool
            .waiting()
            .filter(|entry| self.is_stale(entry, now))
            .map(UnconfirmedTransaction::id)
            .collect();
        for id in &stale {
            state.pool.remove_waiting(*id);
        }
        let count = removed.len() + stale.len();
        if count > 0 {
            debug!(admitted = removed.len(), waiting = stale.len(), "expired transactions removed");
        }
        state.defer_pool_changes(Vec::new(), removed);
        Ok(count)
    }

    /// Retry admission for everything in the waiting queue. Returns the
    /// number admitted.
    pub fn drain_waiting(&self) -> Result<usize, ChainError> {
        let mut state = self.write();
        let added = self.drain_waiting_locked(&mut state)?;
        let count = added.len();
        state.defer_pool_changes(added, Vec::new());
        Ok(count)
    }

    pub(crate) fn drain_waiting_locked(
        &self,
        state: &mut ChainState,
    ) -> Result<Vec<Transaction>, ChainError> {
        let now = self.clock.now();
        let mut added = Vec::new();
        for entry in state.pool.take_waiting() {
            let id = entry.id();
            if self.is_stale(&entry, now) || self.store.has_transaction(id)? {
                continue;
            }
            match self.admit_locked(state, entry.clone()) {
                Ok(tx) => added.push(tx),
                Err(e) if e.is_permanent() => {
                    debug!(transaction = %id, error = %e, "dropping waiting transaction");
                }
                Err(_) => {
                    state.pool.push_waiting(entry);
                }
            }
        }
        Ok(added)
    }

    /// Expired, or waited longer than the retry window.
    fn is_stale(&self, entry: &UnconfirmedTransaction, now: Timestamp) -> bool {
        entry.transaction.expiration() < now
            || entry.arrival.elapsed_since(now) > self.max_waiting_secs
    }

    /// Drop a transaction from the pool entirely.
    pub fn remove_unconfirmed(&self, id: TransactionId) -> Result<bool, ChainError> {
        let mut state = self.write();
        let removed = self.unadmit_locked(&mut state, id)?;
        let waiting = state.pool.remove_waiting(id).is_some();
        let found = removed.is_some() || waiting;
        state.defer_pool_changes(
            Vec::new(),
            removed.map(|entry| entry.transaction).into_iter().collect(),
        );
        Ok(found)
    }
}
