use strata_transactions::{Attachment, Transaction, TransactionError, TransactionType};
use strata_types::ProtocolParams;

use super::attachment_mismatch;
use crate::kind::TransactionKind;
use crate::ledger::Ledger;

/// Plain transfer of coins to a recipient.
pub struct OrdinaryPaymentKind;

impl TransactionKind for OrdinaryPaymentKind {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::ORDINARY_PAYMENT
    }

    fn name(&self) -> &'static str {
        "OrdinaryPayment"
    }

    fn can_have_recipient(&self) -> bool {
        true
    }

    fn must_have_recipient(&self) -> bool {
        true
    }

    fn is_phasing_safe(&self) -> bool {
        true
    }

    fn validate(
        &self,
        tx: &Transaction,
        _ledger: &Ledger,
        _params: &ProtocolParams,
    ) -> Result<(), TransactionError> {
        if !matches!(tx.attachment, Attachment::OrdinaryPayment) {
            return Err(attachment_mismatch(self.name()));
        }
        if tx.amount == 0 {
            return Err(TransactionError::Invalid("payment amount is zero".into()));
        }
        Ok(())
    }
}
