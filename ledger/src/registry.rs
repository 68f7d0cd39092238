//! Dispatch table from transaction type to kind implementation.

use std::collections::HashMap;
use std::sync::Arc;

use strata_transactions::{Transaction, TransactionError, TransactionType};
use strata_types::ProtocolParams;

use crate::kind::TransactionKind;
use crate::kinds::{
    AccountInfoKind, AliasAssignmentKind, ArbitraryMessageKind, OrdinaryPaymentKind,
    PhasingVoteKind,
};
use crate::ledger::Ledger;

#[derive(Clone, Default)]
pub struct TransactionTypeRegistry {
    kinds: HashMap<TransactionType, Arc<dyn TransactionKind>>,
}

impl TransactionTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in kind.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OrdinaryPaymentKind));
        registry.register(Arc::new(ArbitraryMessageKind));
        registry.register(Arc::new(AliasAssignmentKind));
        registry.register(Arc::new(AccountInfoKind));
        registry.register(Arc::new(PhasingVoteKind));
        registry
    }

    /// Add or replace the implementation for a type. Returns the one replaced.
    pub fn register(&mut self, kind: Arc<dyn TransactionKind>) -> Option<Arc<dyn TransactionKind>> {
        self.kinds.insert(kind.transaction_type(), kind)
    }

    pub fn kind(&self, transaction_type: TransactionType) -> Option<&dyn TransactionKind> {
        self.kinds.get(&transaction_type).map(|k| k.as_ref())
    }

    pub fn kind_of(&self, tx: &Transaction) -> Result<&dyn TransactionKind, TransactionError> {
        let ty = tx.transaction_type();
        self.kind(ty)
            .ok_or_else(|| TransactionError::UnknownType(ty.to_string()))
    }

    /// Rules shared by every kind (recipient and phasing shape), then the
    /// kind's own checks. `height` is the height the transaction would be
    /// included at.
    pub fn validate(
        &self,
        tx: &Transaction,
        ledger: &Ledger,
        params: &ProtocolParams,
        height: u32,
    ) -> Result<(), TransactionError> {
        let kind = self.kind_of(tx)?;
        match (tx.recipient.is_some(), kind.can_have_recipient(), kind.must_have_recipient()) {
            (true, false, _) => {
                return Err(TransactionError::Invalid(format!(
                    "{} cannot have a recipient",
                    kind.name()
                )))
            }
            (false, _, true) => {
                return Err(TransactionError::Invalid(format!(
                    "{} requires a recipient",
                    kind.name()
                )))
            }
            _ => {}
        }
        if let Some(phasing) = &tx.phasing {
            if !kind.is_phasing_safe() {
                return Err(TransactionError::Invalid(format!(
                    "{} cannot be phased",
                    kind.name()
                )));
            }
            let latest = height.saturating_add(params.max_phasing_duration);
            if phasing.finish_height <= height || phasing.finish_height > latest {
                return Err(TransactionError::NotCurrentlyValid(format!(
                    "phasing finish height {} outside ({height}, {latest}]",
                    phasing.finish_height
                )));
            }
        }
        kind.validate(tx, ledger, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicates::DuplicateKeys;
    use strata_crypto::keypair_from_seed;
    use strata_transactions::{Attachment, Phasing, TransactionBuilder};
    use strata_types::{AccountId, Timestamp};

    fn alias_tx(seed: u8, alias: &str) -> Transaction {
        let kp = keypair_from_seed(&[seed; 32]);
        TransactionBuilder::new(
            Attachment::AliasAssignment {
                alias: alias.into(),
                uri: "https://example.org".into(),
            },
            Timestamp::new(100),
        )
        .fee(1)
        .sign(&kp)
    }

    #[test]
    fn standard_registry_covers_every_attachment() {
        let registry = TransactionTypeRegistry::standard();
        for ty in [
            TransactionType::ORDINARY_PAYMENT,
            TransactionType::ARBITRARY_MESSAGE,
            TransactionType::ALIAS_ASSIGNMENT,
            TransactionType::ACCOUNT_INFO,
            TransactionType::PHASING_VOTE,
        ] {
            assert!(registry.kind(ty).is_some(), "missing {ty}");
        }
    }

    #[test]
    fn alias_dedup_is_case_insensitive() {
        let registry = TransactionTypeRegistry::standard();
        let first = alias_tx(1, "Strata");
        let second = alias_tx(2, "strata");
        let mut duplicates = DuplicateKeys::new();
        let kind = registry.kind_of(&first).unwrap();
        assert!(!kind.is_duplicate(&first, &mut duplicates));
        assert!(kind.is_duplicate(&second, &mut duplicates));
    }

    #[test]
    fn alias_owned_by_someone_else_is_not_currently_valid() {
        let registry = TransactionTypeRegistry::standard();
        let params = ProtocolParams::live();
        let mut ledger = Ledger::new();
        let owner = alias_tx(1, "taken");
        ledger.set_alias("taken", owner.sender(), "u");
        let thief = alias_tx(2, "TAKEN");
        let err = registry.validate(&thief, &ledger, &params, 1).unwrap_err();
        assert!(!err.is_permanent());
        assert!(registry.validate(&owner, &ledger, &params, 1).is_ok());
    }

    #[test]
    fn payment_requires_recipient() {
        let registry = TransactionTypeRegistry::standard();
        let kp = keypair_from_seed(&[1; 32]);
        let tx = TransactionBuilder::new(Attachment::OrdinaryPayment, Timestamp::new(1))
            .amount(5)
            .fee(1)
            .sign(&kp);
        let err = registry
            .validate(&tx, &Ledger::new(), &ProtocolParams::live(), 1)
            .unwrap_err();
        assert!(err.is_permanent());
    }

    #[test]
    fn alias_cannot_be_phased() {
        let registry = TransactionTypeRegistry::standard();
        let kp = keypair_from_seed(&[1; 32]);
        let tx = TransactionBuilder::new(
            Attachment::AliasAssignment {
                alias: "a".into(),
                uri: String::new(),
            },
            Timestamp::new(1),
        )
        .fee(1)
        .phasing(Phasing {
            finish_height: 10,
            quorum: 1,
        })
        .sign(&kp);
        assert!(registry
            .validate(&tx, &Ledger::new(), &ProtocolParams::live(), 1)
            .is_err());
    }

    #[test]
    fn phased_payment_charges_fee_and_holds_amount() {
        let registry = TransactionTypeRegistry::standard();
        let kp = keypair_from_seed(&[1; 32]);
        let tx = TransactionBuilder::new(Attachment::OrdinaryPayment, Timestamp::new(1))
            .recipient(AccountId::new(99))
            .amount(50)
            .fee(2)
            .phasing(Phasing {
                finish_height: 5,
                quorum: 1,
            })
            .sign(&kp);
        let mut ledger = Ledger::new();
        ledger.credit(tx.sender(), 100).unwrap();
        let kind = registry.kind_of(&tx).unwrap();
        assert!(kind.apply_unconfirmed(&tx, &mut ledger));
        ledger.set_height(1);
        kind.apply(&tx, &mut ledger).unwrap();
        assert_eq!(ledger.balance(tx.sender()), 98);
        assert_eq!(ledger.unconfirmed_balance(tx.sender()), 48);
        assert_eq!(ledger.balance(AccountId::new(99)), 0);

        kind.release_phased(&tx, &mut ledger).unwrap();
        assert_eq!(ledger.balance(tx.sender()), 48);
        assert_eq!(ledger.balance(AccountId::new(99)), 50);
    }
}
