//! Transaction kinds and their payloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use strata_types::TxHash;

/// The `(type, subtype)` pair that selects a transaction kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionType {
    pub kind: u8,
    pub subtype: u8,
}

impl TransactionType {
    pub const ORDINARY_PAYMENT: Self = Self::new(0, 0);
    pub const ARBITRARY_MESSAGE: Self = Self::new(1, 0);
    pub const ALIAS_ASSIGNMENT: Self = Self::new(1, 1);
    pub const ACCOUNT_INFO: Self = Self::new(1, 5);
    pub const PHASING_VOTE: Self = Self::new(1, 9);

    pub const fn new(kind: u8, subtype: u8) -> Self {
        Self { kind, subtype }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)
    }
}

/// Kind-specific payload of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Attachment {
    OrdinaryPayment,
    ArbitraryMessage {
        message: Vec<u8>,
    },
    AliasAssignment {
        alias: String,
        uri: String,
    },
    AccountInfo {
        name: String,
        description: String,
    },
    /// Approval of phased transactions, named by full hash.
    PhasingVote {
        transactions: Vec<TxHash>,
    },
}

impl Attachment {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Self::OrdinaryPayment => TransactionType::ORDINARY_PAYMENT,
            Self::ArbitraryMessage { .. } => TransactionType::ARBITRARY_MESSAGE,
            Self::AliasAssignment { .. } => TransactionType::ALIAS_ASSIGNMENT,
            Self::AccountInfo { .. } => TransactionType::ACCOUNT_INFO,
            Self::PhasingVote { .. } => TransactionType::PHASING_VOTE,
        }
    }

    pub(crate) fn write_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Self::OrdinaryPayment => {}
            Self::ArbitraryMessage { message } => {
                out.extend_from_slice(&(message.len() as u32).to_le_bytes());
                out.extend_from_slice(message);
            }
            Self::AliasAssignment { alias, uri } => {
                write_str(out, alias);
                write_str(out, uri);
            }
            Self::AccountInfo { name, description } => {
                write_str(out, name);
                write_str(out, description);
            }
            Self::PhasingVote { transactions } => {
                out.extend_from_slice(&(transactions.len() as u32).to_le_bytes());
                for hash in transactions {
                    out.extend_from_slice(hash.as_bytes());
                }
            }
        }
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}
