//! Stateless transaction checks.
//!
//! Stateful checks (balances, EC block, references, kind rules) are done by
//! the ledger and the chain service.

use strata_types::{ProtocolParams, Timestamp};

use crate::error::TransactionError;
use crate::transaction::Transaction;

/// Check a transaction's timing against `reference`: the local clock for
/// pool admission, or the containing block's timestamp during block apply.
pub fn check_timing(
    tx: &Transaction,
    reference: Timestamp,
    max_timedrift_secs: u64,
) -> Result<(), TransactionError> {
    if tx.timestamp > reference.plus_secs(max_timedrift_secs) {
        return Err(TransactionError::TimestampInFuture {
            timestamp: tx.timestamp,
        });
    }
    if tx.expiration() < reference {
        return Err(TransactionError::Expired {
            expiration: tx.expiration(),
        });
    }
    Ok(())
}

/// Validate everything about `tx` that needs no chain state: version,
/// deadline, fee and amount bounds, phasing shape, timing and signature.
///
/// Signature verification is the most expensive step and runs last.
pub fn validate_transaction(
    tx: &Transaction,
    params: &ProtocolParams,
    reference: Timestamp,
    verify_signature: bool,
) -> Result<(), TransactionError> {
    if tx.version != 1 {
        return Err(TransactionError::UnsupportedVersion(tx.version));
    }
    if tx.deadline == 0 || tx.deadline > params.max_deadline_minutes {
        return Err(TransactionError::Invalid(format!(
            "deadline {} outside 1..={}",
            tx.deadline, params.max_deadline_minutes
        )));
    }
    if tx.fee < params.min_fee || tx.fee > params.max_balance {
        return Err(TransactionError::Invalid(format!("fee {} out of range", tx.fee)));
    }
    if tx.amount > params.max_balance {
        return Err(TransactionError::Invalid(format!(
            "amount {} out of range",
            tx.amount
        )));
    }
    if let Some(hash) = &tx.referenced_transaction_full_hash {
        if hash.is_zero() {
            return Err(TransactionError::Invalid(
                "zero referenced transaction hash".into(),
            ));
        }
    }
    if let Some(phasing) = &tx.phasing {
        if phasing.quorum == 0 {
            return Err(TransactionError::Invalid("phasing quorum is zero".into()));
        }
    }
    check_timing(tx, reference, params.max_timedrift_secs)?;
    if verify_signature && !tx.verify_signature() {
        return Err(TransactionError::InvalidSignature);
    }
    Ok(())
}
