//! Built-in transaction kinds.

mod messaging;
mod payment;

pub use messaging::{AccountInfoKind, AliasAssignmentKind, ArbitraryMessageKind, PhasingVoteKind};
pub use payment::OrdinaryPaymentKind;

use strata_transactions::TransactionError;

pub(crate) fn attachment_mismatch(kind: &str) -> TransactionError {
    TransactionError::Invalid(format!("attachment does not match {kind}"))
}

pub(crate) fn require_zero_amount(amount: u64, kind: &str) -> Result<(), TransactionError> {
    if amount != 0 {
        return Err(TransactionError::Invalid(format!(
            "{kind} must not transfer an amount"
        )));
    }
    Ok(())
}
