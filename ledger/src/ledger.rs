//! The account ledger: balances, aliases, account info and phasing polls.
//!
//! All tables are height-versioned. Writes are tagged with the ledger's
//! working height, which the chain service sets before applying a block.

use strata_transactions::Transaction;
use strata_types::{AccountId, PublicKey, TxHash};

use crate::account::{AccountInfo, AccountRecord, Alias};
use crate::derived::{DerivedState, RollbackError};
use crate::error::LedgerError;
use crate::phasing::PhasingPoll;
use crate::versioned::VersionedTable;

#[derive(Clone, Debug)]
pub struct Ledger {
    height: u32,
    accounts: VersionedTable<AccountId, AccountRecord>,
    aliases: VersionedTable<String, Alias>,
    account_info: VersionedTable<AccountId, AccountInfo>,
    polls: VersionedTable<TxHash, PhasingPoll>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            height: 0,
            accounts: VersionedTable::new("accounts"),
            aliases: VersionedTable::new("aliases"),
            account_info: VersionedTable::new("account_info"),
            polls: VersionedTable::new("phasing_polls"),
        }
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Height subsequent writes are tagged with.
    pub fn set_height(&mut self, height: u32) {
        self.height = height;
    }

    // ── Accounts ─────────────────────────────────────────────────────────

    pub fn account(&self, id: AccountId) -> Option<&AccountRecord> {
        self.accounts.get(&id)
    }

    pub fn balance(&self, id: AccountId) -> u64 {
        self.account(id).map_or(0, |a| a.balance)
    }

    pub fn unconfirmed_balance(&self, id: AccountId) -> u64 {
        self.account(id).map_or(0, |a| a.unconfirmed_balance)
    }

    /// Confirmed balance as of `height`.
    pub fn balance_at(&self, id: AccountId, height: u32) -> u64 {
        self.accounts.get_at(&id, height).map_or(0, |a| a.balance)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &AccountRecord> {
        self.accounts.iter().map(|(_, a)| a)
    }

    fn update_account<F>(&mut self, id: AccountId, f: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&mut AccountRecord) -> Result<(), LedgerError>,
    {
        let mut record = self
            .accounts
            .get(&id)
            .cloned()
            .unwrap_or_else(|| AccountRecord::new(id));
        f(&mut record)?;
        self.accounts.insert(id, record, self.height);
        Ok(())
    }

    /// Add `amount` to both balances.
    pub fn credit(&mut self, id: AccountId, amount: u64) -> Result<(), LedgerError> {
        self.update_account(id, |a| {
            a.balance = a
                .balance
                .checked_add(amount)
                .ok_or(LedgerError::Overflow { account: id })?;
            a.unconfirmed_balance = a
                .unconfirmed_balance
                .checked_add(amount)
                .ok_or(LedgerError::Overflow { account: id })?;
            Ok(())
        })
    }

    /// Take `amount` out of the confirmed balance only. The matching
    /// reservation must already have been made with [`reserve`](Self::reserve).
    pub fn debit_confirmed(&mut self, id: AccountId, amount: u64) -> Result<(), LedgerError> {
        self.update_account(id, |a| {
            let balance = a
                .balance
                .checked_sub(amount)
                .ok_or(LedgerError::InsufficientBalance { account: id })?;
            if balance < a.unconfirmed_balance {
                return Err(LedgerError::InsufficientBalance { account: id });
            }
            a.balance = balance;
            Ok(())
        })
    }

    /// Reserve `amount` from the unconfirmed balance. Returns `false` and
    /// changes nothing when the account cannot cover it.
    pub fn reserve(&mut self, id: AccountId, amount: u64) -> bool {
        if self.unconfirmed_balance(id) < amount {
            return false;
        }
        self.update_account(id, |a| {
            a.unconfirmed_balance -= amount;
            Ok(())
        })
        .is_ok()
    }

    /// Return a reservation made with [`reserve`](Self::reserve).
    pub fn release(&mut self, id: AccountId, amount: u64) -> Result<(), LedgerError> {
        self.update_account(id, |a| {
            let unconfirmed = a
                .unconfirmed_balance
                .checked_add(amount)
                .ok_or(LedgerError::Overflow { account: id })?;
            if unconfirmed > a.balance {
                return Err(LedgerError::Overflow { account: id });
            }
            a.unconfirmed_balance = unconfirmed;
            Ok(())
        })
    }

    pub fn set_public_key(&mut self, id: AccountId, key: PublicKey) -> Result<(), LedgerError> {
        if self.account(id).and_then(|a| a.public_key).is_some() {
            return Ok(());
        }
        self.update_account(id, |a| {
            a.public_key = Some(key);
            Ok(())
        })
    }

    // ── Aliases ──────────────────────────────────────────────────────────

    pub fn alias(&self, name: &str) -> Option<&Alias> {
        self.aliases.get(&name.to_lowercase())
    }

    pub fn set_alias(&mut self, name: &str, owner: AccountId, uri: &str) {
        let alias = Alias {
            name: name.to_string(),
            owner,
            uri: uri.to_string(),
        };
        self.aliases.insert(name.to_lowercase(), alias, self.height);
    }

    // ── Account info ─────────────────────────────────────────────────────

    pub fn account_info(&self, id: AccountId) -> Option<&AccountInfo> {
        self.account_info.get(&id)
    }

    pub fn set_account_info(&mut self, id: AccountId, info: AccountInfo) {
        self.account_info.insert(id, info, self.height);
    }

    // ── Phasing polls ────────────────────────────────────────────────────

    pub fn poll(&self, full_hash: &TxHash) -> Option<&PhasingPoll> {
        self.polls.get(full_hash)
    }

    pub fn open_poll(&mut self, tx: &Transaction, finish_height: u32, quorum: u32) {
        let poll = PhasingPoll {
            transaction: tx.clone(),
            finish_height,
            quorum,
            voters: Vec::new(),
            resolved: false,
        };
        self.polls.insert(tx.full_hash(), poll, self.height);
    }

    /// Record a vote. Repeat votes from the same account count once.
    pub fn vote(&mut self, full_hash: &TxHash, voter: AccountId) -> Result<(), LedgerError> {
        let mut poll = self
            .polls
            .get(full_hash)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownPoll(full_hash.to_string()))?;
        if !poll.voters.contains(&voter) {
            poll.voters.push(voter);
            self.polls.insert(*full_hash, poll, self.height);
        }
        Ok(())
    }

    pub fn resolve_poll(&mut self, full_hash: &TxHash) -> Result<(), LedgerError> {
        let mut poll = self
            .polls
            .get(full_hash)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownPoll(full_hash.to_string()))?;
        poll.resolved = true;
        self.polls.insert(*full_hash, poll, self.height);
        Ok(())
    }

    /// Unresolved polls due at `height`, ordered by transaction id.
    pub fn polls_finishing_at(&self, height: u32) -> Vec<PhasingPoll> {
        let mut due: Vec<PhasingPoll> = self
            .polls
            .iter()
            .filter(|(_, p)| !p.resolved && p.finish_height == height)
            .map(|(_, p)| p.clone())
            .collect();
        due.sort_by_key(|p| p.transaction.id());
        due
    }

    /// Unresolved polls whose quorum is already met, ordered by transaction id.
    pub fn polls_with_quorum(&self) -> Vec<PhasingPoll> {
        let mut ready: Vec<PhasingPoll> = self
            .polls
            .iter()
            .filter(|(_, p)| !p.resolved && p.approved())
            .map(|(_, p)| p.clone())
            .collect();
        ready.sort_by_key(|p| p.transaction.id());
        ready
    }

    /// Derived-state tables in a fixed order, for trim/rollback fan-out.
    fn tables_mut(&mut self) -> [&mut dyn DerivedState; 4] {
        [
            &mut self.accounts,
            &mut self.aliases,
            &mut self.account_info,
            &mut self.polls,
        ]
    }
}

impl DerivedState for Ledger {
    fn name(&self) -> &'static str {
        "ledger"
    }

    fn trim(&mut self, height: u32) {
        for table in self.tables_mut() {
            table.trim(height);
        }
        tracing::debug!(height, "ledger history trimmed");
    }

    fn rollback(&mut self, height: u32) -> Result<(), RollbackError> {
        for table in self.tables_mut() {
            table.rollback(height)?;
        }
        tracing::debug!(from = self.height, to = height, "ledger rolled back");
        self.height = height;
        Ok(())
    }

    fn truncate(&mut self) {
        for table in self.tables_mut() {
            table.truncate();
        }
        self.height = 0;
    }
}
