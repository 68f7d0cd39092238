//! JSON request/response shapes exchanged with peers.
//!
//! Requests are objects tagged by `requestType`; field names are camelCase.
//! Ids are decimal strings and the cumulative difficulty is a decimal string.
//! A peer that cannot answer returns `{"error": "..."}`.

use serde::{Deserialize, Serialize};
use strata_ledger::Block;
use strata_transactions::Transaction;
use strata_types::{BlockId, TransactionId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "requestType",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum PeerRequest {
    GetCumulativeDifficulty,
    GetMilestoneBlockIds {
        #[serde(default)]
        last_block_id: Option<BlockId>,
        #[serde(default)]
        last_milestone_block_id: Option<BlockId>,
    },
    GetNextBlockIds {
        block_id: BlockId,
        limit: u32,
    },
    GetNextBlocks {
        block_id: BlockId,
        limit: u32,
    },
    GetUnconfirmedTransactions {
        #[serde(default)]
        exclude: Vec<TransactionId>,
    },
    GetTransactions {
        transaction_ids: Vec<TransactionId>,
    },
    ProcessBlock {
        block: Box<Block>,
    },
    ProcessTransactions {
        transactions: Vec<Transaction>,
    },
}

impl PeerRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetCumulativeDifficulty => "getCumulativeDifficulty",
            Self::GetMilestoneBlockIds { .. } => "getMilestoneBlockIds",
            Self::GetNextBlockIds { .. } => "getNextBlockIds",
            Self::GetNextBlocks { .. } => "getNextBlocks",
            Self::GetUnconfirmedTransactions { .. } => "getUnconfirmedTransactions",
            Self::GetTransactions { .. } => "getTransactions",
            Self::ProcessBlock { .. } => "processBlock",
            Self::ProcessTransactions { .. } => "processTransactions",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeDifficulty {
    #[serde(with = "strata_types::decimal")]
    pub cumulative_difficulty: u128,
    pub blockchain_height: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneBlockIds {
    pub milestone_block_ids: Vec<BlockId>,
    /// The first id is the requester's own head.
    #[serde(default)]
    pub last: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextBlockIds {
    pub next_block_ids: Vec<BlockId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnconfirmedTransactions {
    pub unconfirmed_transactions: Vec<Transaction>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transactions {
    pub transactions: Vec<Transaction>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Processed {
    pub accepted: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_are_tagged_by_request_type() {
        let req = PeerRequest::GetNextBlockIds {
            block_id: BlockId::new(42),
            limit: 10,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({"requestType": "getNextBlockIds", "blockId": "42", "limit": 10})
        );
        assert_eq!(req.name(), "getNextBlockIds");
    }

    #[test]
    fn milestone_request_fields_are_optional() {
        let req: PeerRequest =
            serde_json::from_value(json!({"requestType": "getMilestoneBlockIds", "lastBlockId": "7"}))
                .unwrap();
        assert_eq!(
            req,
            PeerRequest::GetMilestoneBlockIds {
                last_block_id: Some(BlockId::new(7)),
                last_milestone_block_id: None,
            }
        );
    }

    #[test]
    fn difficulty_is_a_decimal_string() {
        let resp = CumulativeDifficulty {
            cumulative_difficulty: 1 << 100,
            blockchain_height: 3,
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["cumulativeDifficulty"], json!((1u128 << 100).to_string()));
        assert_eq!(value["blockchainHeight"], json!(3));
    }

    #[test]
    fn missing_last_flag_defaults_to_false() {
        let resp: MilestoneBlockIds =
            serde_json::from_value(json!({"milestoneBlockIds": ["1", "2"]})).unwrap();
        assert!(!resp.last);
        assert_eq!(resp.milestone_block_ids.len(), 2);
    }
}
