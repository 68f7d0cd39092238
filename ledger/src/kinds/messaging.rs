//! Messaging kinds: arbitrary messages, aliases, account info and phasing votes.

use strata_transactions::{Attachment, Transaction, TransactionError, TransactionType};
use strata_types::ProtocolParams;

use super::{attachment_mismatch, require_zero_amount};
use crate::account::AccountInfo;
use crate::duplicates::DuplicateKey;
use crate::error::LedgerError;
use crate::kind::TransactionKind;
use crate::ledger::Ledger;

const MAX_VOTED_TRANSACTIONS: usize = 10;

fn check_length(field: &str, len: usize, max: u32) -> Result<(), TransactionError> {
    if len > max as usize {
        return Err(TransactionError::Invalid(format!(
            "{field} length {len} exceeds {max}"
        )));
    }
    Ok(())
}

// ── Arbitrary message ────────────────────────────────────────────────────

pub struct ArbitraryMessageKind;

impl TransactionKind for ArbitraryMessageKind {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::ARBITRARY_MESSAGE
    }

    fn name(&self) -> &'static str {
        "ArbitraryMessage"
    }

    fn can_have_recipient(&self) -> bool {
        true
    }

    fn is_phasing_safe(&self) -> bool {
        true
    }

    fn validate(
        &self,
        tx: &Transaction,
        _ledger: &Ledger,
        params: &ProtocolParams,
    ) -> Result<(), TransactionError> {
        let Attachment::ArbitraryMessage { message } = &tx.attachment else {
            return Err(attachment_mismatch(self.name()));
        };
        require_zero_amount(tx.amount, self.name())?;
        if message.is_empty() {
            return Err(TransactionError::Invalid("empty message".into()));
        }
        check_length("message", message.len(), params.max_message_length)
    }
}

// ── Alias assignment ─────────────────────────────────────────────────────

/// Claims or updates an alias. The first assigner owns it.
pub struct AliasAssignmentKind;

impl TransactionKind for AliasAssignmentKind {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::ALIAS_ASSIGNMENT
    }

    fn name(&self) -> &'static str {
        "AliasAssignment"
    }

    fn can_have_recipient(&self) -> bool {
        false
    }

    fn is_phasing_safe(&self) -> bool {
        false
    }

    fn validate(
        &self,
        tx: &Transaction,
        ledger: &Ledger,
        params: &ProtocolParams,
    ) -> Result<(), TransactionError> {
        let Attachment::AliasAssignment { alias, uri } = &tx.attachment else {
            return Err(attachment_mismatch(self.name()));
        };
        require_zero_amount(tx.amount, self.name())?;
        if alias.is_empty() || !alias.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TransactionError::Invalid(format!(
                "alias {alias:?} must be non-empty ascii alphanumeric"
            )));
        }
        check_length("alias", alias.len(), params.max_alias_length)?;
        check_length("alias uri", uri.len(), params.max_alias_uri_length)?;
        if let Some(existing) = ledger.alias(alias) {
            if existing.owner != tx.sender() {
                return Err(TransactionError::NotCurrentlyValid(format!(
                    "alias {alias} is owned by {}",
                    existing.owner
                )));
            }
        }
        Ok(())
    }

    fn duplicate_key(&self, tx: &Transaction) -> Option<DuplicateKey> {
        match &tx.attachment {
            Attachment::AliasAssignment { alias, .. } => Some(DuplicateKey::unique(
                TransactionType::ALIAS_ASSIGNMENT,
                alias.to_lowercase(),
            )),
            _ => None,
        }
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &mut Ledger) -> Result<(), LedgerError> {
        if let Attachment::AliasAssignment { alias, uri } = &tx.attachment {
            ledger.set_alias(alias, tx.sender(), uri);
        }
        Ok(())
    }
}

// ── Account info ─────────────────────────────────────────────────────────

pub struct AccountInfoKind;

impl TransactionKind for AccountInfoKind {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::ACCOUNT_INFO
    }

    fn name(&self) -> &'static str {
        "AccountInfo"
    }

    fn can_have_recipient(&self) -> bool {
        false
    }

    fn is_phasing_safe(&self) -> bool {
        true
    }

    fn validate(
        &self,
        tx: &Transaction,
        _ledger: &Ledger,
        params: &ProtocolParams,
    ) -> Result<(), TransactionError> {
        let Attachment::AccountInfo { name, description } = &tx.attachment else {
            return Err(attachment_mismatch(self.name()));
        };
        require_zero_amount(tx.amount, self.name())?;
        check_length("account name", name.len(), params.max_account_name_length)?;
        check_length(
            "account description",
            description.len(),
            params.max_account_description_length,
        )
    }

    fn duplicate_key(&self, tx: &Transaction) -> Option<DuplicateKey> {
        Some(DuplicateKey::unique(
            TransactionType::ACCOUNT_INFO,
            tx.sender().to_string(),
        ))
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &mut Ledger) -> Result<(), LedgerError> {
        if let Attachment::AccountInfo { name, description } = &tx.attachment {
            ledger.set_account_info(
                tx.sender(),
                AccountInfo {
                    name: name.clone(),
                    description: description.clone(),
                },
            );
        }
        Ok(())
    }
}

// ── Phasing vote ─────────────────────────────────────────────────────────

/// Approves one or more open phasing polls.
pub struct PhasingVoteKind;

impl TransactionKind for PhasingVoteKind {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::PHASING_VOTE
    }

    fn name(&self) -> &'static str {
        "PhasingVote"
    }

    fn can_have_recipient(&self) -> bool {
        false
    }

    fn is_phasing_safe(&self) -> bool {
        false
    }

    fn validate(
        &self,
        tx: &Transaction,
        ledger: &Ledger,
        _params: &ProtocolParams,
    ) -> Result<(), TransactionError> {
        let Attachment::PhasingVote { transactions } = &tx.attachment else {
            return Err(attachment_mismatch(self.name()));
        };
        require_zero_amount(tx.amount, self.name())?;
        if transactions.is_empty() || transactions.len() > MAX_VOTED_TRANSACTIONS {
            return Err(TransactionError::Invalid(format!(
                "vote must name 1..={MAX_VOTED_TRANSACTIONS} transactions"
            )));
        }
        for full_hash in transactions {
            match ledger.poll(full_hash) {
                Some(poll) if !poll.resolved => {}
                _ => {
                    return Err(TransactionError::NotCurrentlyValid(format!(
                        "no open poll for {full_hash}"
                    )))
                }
            }
        }
        Ok(())
    }

    fn apply_attachment(&self, tx: &Transaction, ledger: &mut Ledger) -> Result<(), LedgerError> {
        if let Attachment::PhasingVote { transactions } = &tx.attachment {
            let voter = tx.sender();
            for full_hash in transactions {
                ledger.vote(full_hash, voter)?;
            }
        }
        Ok(())
    }
}
