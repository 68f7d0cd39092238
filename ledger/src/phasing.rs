use serde::{Deserialize, Serialize};
use strata_transactions::Transaction;
use strata_types::AccountId;

/// An open vote on a phased transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasingPoll {
    pub transaction: Transaction,
    pub finish_height: u32,
    pub quorum: u32,
    pub voters: Vec<AccountId>,
    pub resolved: bool,
}

impl PhasingPoll {
    pub fn approved(&self) -> bool {
        self.voters.len() as u64 >= u64::from(self.quorum)
    }
}
