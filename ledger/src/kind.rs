//! The contract every transaction kind satisfies.
//!
//! Kinds supply their attachment-specific rules; the balance bookkeeping
//! shared by all kinds is provided here so every kind reserves, debits and
//! credits the same way.

use strata_transactions::{Transaction, TransactionError, TransactionType};
use strata_types::ProtocolParams;

use crate::duplicates::{DuplicateKey, DuplicateKeys};
use crate::error::LedgerError;
use crate::ledger::Ledger;

pub trait TransactionKind: Send + Sync {
    fn transaction_type(&self) -> TransactionType;

    fn name(&self) -> &'static str;

    fn can_have_recipient(&self) -> bool;

    fn must_have_recipient(&self) -> bool {
        false
    }

    fn is_phasing_safe(&self) -> bool;

    /// Kind-specific checks against the current ledger.
    fn validate(
        &self,
        tx: &Transaction,
        ledger: &Ledger,
        params: &ProtocolParams,
    ) -> Result<(), TransactionError>;

    /// Key this transaction must not share with others in the same block or pool.
    fn duplicate_key(&self, _tx: &Transaction) -> Option<DuplicateKey> {
        None
    }

    /// Effect of the attachment once the transaction takes effect.
    fn apply_attachment(&self, _tx: &Transaction, _ledger: &mut Ledger) -> Result<(), LedgerError> {
        Ok(())
    }

    // ── Shared bookkeeping ───────────────────────────────────────────────

    /// Reserve `amount + fee` from the sender. `false` means insufficient funds.
    fn apply_unconfirmed(&self, tx: &Transaction, ledger: &mut Ledger) -> bool {
        match tx.amount.checked_add(tx.fee) {
            Some(total) => ledger.reserve(tx.sender(), total),
            None => false,
        }
    }

    fn undo_unconfirmed(&self, tx: &Transaction, ledger: &mut Ledger) -> Result<(), LedgerError> {
        let sender = tx.sender();
        let total = tx
            .amount
            .checked_add(tx.fee)
            .ok_or(LedgerError::Overflow { account: sender })?;
        ledger.release(sender, total)
    }

    /// Commit the transaction's effects. Phased transactions only pay their
    /// fee here and open a poll; the rest waits for release.
    fn apply(&self, tx: &Transaction, ledger: &mut Ledger) -> Result<(), LedgerError> {
        let sender = tx.sender();
        ledger.set_public_key(sender, tx.sender_public_key)?;
        if let Some(phasing) = &tx.phasing {
            ledger.debit_confirmed(sender, tx.fee)?;
            ledger.open_poll(tx, phasing.finish_height, phasing.quorum);
            return Ok(());
        }
        let total = tx
            .amount
            .checked_add(tx.fee)
            .ok_or(LedgerError::Overflow { account: sender })?;
        ledger.debit_confirmed(sender, total)?;
        if let Some(recipient) = tx.recipient {
            ledger.credit(recipient, tx.amount)?;
        }
        self.apply_attachment(tx, ledger)
    }

    /// Carry out a phased transaction whose poll passed.
    fn release_phased(&self, tx: &Transaction, ledger: &mut Ledger) -> Result<(), LedgerError> {
        ledger.debit_confirmed(tx.sender(), tx.amount)?;
        if let Some(recipient) = tx.recipient {
            ledger.credit(recipient, tx.amount)?;
        }
        self.apply_attachment(tx, ledger)
    }

    /// Drop a phased transaction whose poll failed, returning its amount.
    fn reject_phased(&self, tx: &Transaction, ledger: &mut Ledger) -> Result<(), LedgerError> {
        ledger.release(tx.sender(), tx.amount)
    }

    /// Register this transaction's duplicate key. `true` if it collides.
    fn is_duplicate(&self, tx: &Transaction, duplicates: &mut DuplicateKeys) -> bool {
        match self.duplicate_key(tx) {
            Some(key) => !duplicates.try_register(&key),
            None => false,
        }
    }
}
