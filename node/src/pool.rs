//! The unconfirmed transaction pool.
//!
//! Two stores share one ordering. The admitted table holds transactions
//! whose funds are reserved in the ledger; the waiting queue holds the ones
//! that could not be admitted yet or were requeued after a rollback. This
//! module only keeps the collections; ledger reservations are made by the
//! chain service, which owns the pool behind its lock.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use strata_ledger::DuplicateKeys;
use strata_transactions::Transaction;
use strata_types::{Timestamp, TransactionId};

/// A transaction held by the pool, with the fields that order it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnconfirmedTransaction {
    pub transaction: Transaction,
    pub arrival: Timestamp,
    pub fee_per_byte: u64,
    /// Chain height the transaction was seen at, or confirmed at before a pop-off.
    pub height: u32,
}

impl UnconfirmedTransaction {
    pub fn new(transaction: Transaction, arrival: Timestamp, height: u32) -> Self {
        Self {
            fee_per_byte: transaction.fee_per_byte(),
            transaction,
            arrival,
            height,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.transaction.id()
    }

    pub fn priority(&self) -> Priority {
        Priority {
            height: self.height,
            has_reference: self.transaction.referenced_transaction_full_hash.is_some(),
            fee_per_byte: self.fee_per_byte,
            arrival: self.arrival,
            id: self.id(),
        }
    }
}

/// Pool ordering key. The smallest entry has the lowest priority and is the
/// first evicted; blocks are filled from the largest down.
///
/// Fields compare in this exact order: height descending, reference present
/// first, fee per byte ascending, arrival descending, id descending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Priority {
    pub height: u32,
    pub has_reference: bool,
    pub fee_per_byte: u64,
    pub arrival: Timestamp,
    pub id: TransactionId,
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .height
            .cmp(&self.height)
            .then(other.has_reference.cmp(&self.has_reference))
            .then(self.fee_per_byte.cmp(&other.fee_per_byte))
            .then(other.arrival.cmp(&self.arrival))
            .then(other.id.cmp(&self.id))
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Debug, Default)]
pub struct UnconfirmedPool {
    max_size: usize,
    admitted: HashMap<TransactionId, UnconfirmedTransaction>,
    admitted_order: BTreeSet<Priority>,
    waiting: BTreeMap<Priority, UnconfirmedTransaction>,
    waiting_ids: HashMap<TransactionId, Priority>,
    /// Dedup keys claimed by admitted transactions.
    pub(crate) duplicates: DuplicateKeys,
    /// Locally submitted transactions still to be confirmed.
    broadcasted: HashSet<TransactionId>,
}

impl UnconfirmedPool {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    // ── Admitted table ───────────────────────────────────────────────────

    pub fn admitted_len(&self) -> usize {
        self.admitted.len()
    }

    pub fn is_full(&self) -> bool {
        self.admitted.len() >= self.max_size
    }

    pub fn is_admitted(&self, id: TransactionId) -> bool {
        self.admitted.contains_key(&id)
    }

    pub fn get(&self, id: TransactionId) -> Option<&UnconfirmedTransaction> {
        self.admitted.get(&id)
    }

    /// Admitted transactions, highest priority first.
    pub fn admitted(&self) -> impl Iterator<Item = &UnconfirmedTransaction> + '_ {
        self.admitted_order
            .iter()
            .rev()
            .filter_map(move |p| self.admitted.get(&p.id))
    }

    /// The entry eviction would remove next.
    pub fn lowest_admitted(&self) -> Option<Priority> {
        self.admitted_order.first().copied()
    }

    pub fn insert_admitted(&mut self, entry: UnconfirmedTransaction) {
        self.admitted_order.insert(entry.priority());
        self.admitted.insert(entry.id(), entry);
    }

    pub fn remove_admitted(&mut self, id: TransactionId) -> Option<UnconfirmedTransaction> {
        let entry = self.admitted.remove(&id)?;
        self.admitted_order.remove(&entry.priority());
        Some(entry)
    }

    /// Empty the admitted table, highest priority first.
    pub fn take_admitted(&mut self) -> Vec<UnconfirmedTransaction> {
        let order = std::mem::take(&mut self.admitted_order);
        let mut admitted = std::mem::take(&mut self.admitted);
        order
            .into_iter()
            .rev()
            .filter_map(|p| admitted.remove(&p.id))
            .collect()
    }

    // ── Waiting queue ────────────────────────────────────────────────────

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_waiting(&self, id: TransactionId) -> bool {
        self.waiting_ids.contains_key(&id)
    }

    /// Waiting transactions, highest priority first.
    pub fn waiting(&self) -> impl Iterator<Item = &UnconfirmedTransaction> + '_ {
        self.waiting.values().rev()
    }

    /// Queue an entry. Returns the lowest-priority entry when the queue
    /// overflows, which may be the one just offered.
    pub fn push_waiting(&mut self, entry: UnconfirmedTransaction) -> Option<UnconfirmedTransaction> {
        let id = entry.id();
        if self.waiting_ids.contains_key(&id) {
            return None;
        }
        let priority = entry.priority();
        self.waiting.insert(priority, entry);
        self.waiting_ids.insert(id, priority);
        if self.waiting.len() <= self.max_size {
            return None;
        }
        let (evicted_priority, evicted) = self.waiting.pop_first()?;
        self.waiting_ids.remove(&evicted_priority.id);
        Some(evicted)
    }

    pub fn remove_waiting(&mut self, id: TransactionId) -> Option<UnconfirmedTransaction> {
        let priority = self.waiting_ids.remove(&id)?;
        self.waiting.remove(&priority)
    }

    /// Empty the waiting queue, highest priority first.
    pub fn take_waiting(&mut self) -> Vec<UnconfirmedTransaction> {
        self.waiting_ids.clear();
        std::mem::take(&mut self.waiting).into_values().rev().collect()
    }

    // ── Rebroadcast set ──────────────────────────────────────────────────

    pub fn mark_broadcasted(&mut self, id: TransactionId) {
        self.broadcasted.insert(id);
    }

    /// Locally submitted transactions that are still admitted.
    pub fn broadcasted(&self) -> Vec<Transaction> {
        self.admitted()
            .filter(|entry| self.broadcasted.contains(&entry.id()))
            .map(|entry| entry.transaction.clone())
            .collect()
    }

    /// Drop confirmed transactions from the waiting queue and rebroadcast set.
    pub fn forget(&mut self, ids: &[TransactionId]) {
        for id in ids {
            self.remove_waiting(*id);
            self.broadcasted.remove(id);
        }
    }

    pub fn contains(&self, id: TransactionId) -> bool {
        self.is_admitted(id) || self.is_waiting(id)
    }
}
