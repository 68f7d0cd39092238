use strata_types::{Timestamp, TxHash};
use thiserror::Error;

/// Why a transaction was refused.
///
/// Variants split into two families. Permanent failures never heal and the
/// transaction can be dropped. Not-currently-valid failures depend on chain
/// or pool state and may pass on a later attempt; see [`Self::is_permanent`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransactionError {
    // ── Permanent ────────────────────────────────────────────────────────
    #[error("invalid signature")]
    InvalidSignature,

    #[error("unsupported transaction version {0}")]
    UnsupportedVersion(u8),

    #[error("transaction expired at {expiration}")]
    Expired { expiration: Timestamp },

    #[error("transaction is already confirmed")]
    AlreadyConfirmed,

    #[error("transaction is already in the unconfirmed pool")]
    AlreadyAdmitted,

    #[error("no transaction kind registered for type {0}")]
    UnknownType(String),

    #[error("{0}")]
    Invalid(String),

    // ── Not currently valid ──────────────────────────────────────────────
    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("timestamp {timestamp} is too far in the future")]
    TimestampInFuture { timestamp: Timestamp },

    #[error("referenced transaction {0} is not confirmed")]
    MissingReference(TxHash),

    #[error("ec block does not match the chain at height {height}")]
    EcBlockMismatch { height: u32 },

    #[error("conflicts with another transaction on {key}")]
    DuplicateKey { key: String },

    #[error("unconfirmed pool is full")]
    PoolFull,

    #[error("{0}")]
    NotCurrentlyValid(String),
}

impl TransactionError {
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature
                | Self::UnsupportedVersion(_)
                | Self::Expired { .. }
                | Self::AlreadyConfirmed
                | Self::AlreadyAdmitted
                | Self::UnknownType(_)
                | Self::Invalid(_)
        )
    }
}
