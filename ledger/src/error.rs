use strata_types::AccountId;
use thiserror::Error;

/// A ledger mutation that would break a balance invariant.
///
/// These never occur for transactions that passed validation and
/// `apply_unconfirmed`; seeing one during block apply rejects the block.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("account {account} has insufficient balance")]
    InsufficientBalance { account: AccountId },

    #[error("balance overflow on account {account}")]
    Overflow { account: AccountId },

    #[error("unknown phasing poll {0}")]
    UnknownPoll(String),
}
