//! Rows of the ledger tables.

use serde::{Deserialize, Serialize};
use strata_types::{AccountId, PublicKey};

/// Balances of one account.
///
/// `unconfirmed_balance` is `balance` minus every reservation held by the
/// unconfirmed pool and by pending phased transactions, so it never exceeds
/// `balance`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: AccountId,
    pub public_key: Option<PublicKey>,
    pub balance: u64,
    pub unconfirmed_balance: u64,
}

impl AccountRecord {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    /// Name as first assigned; lookups are case-insensitive.
    pub name: String,
    pub owner: AccountId,
    pub uri: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub name: String,
    pub description: String,
}
