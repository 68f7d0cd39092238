//! The peer contract.
//!
//! A transport implements [`Peer::request`]; the typed calls are provided
//! on top of it and decode the JSON answer.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use strata_ledger::Block;
use strata_transactions::Transaction;
use strata_types::{BlockId, TransactionId};

use crate::wire::{
    CumulativeDifficulty, ErrorResponse, MilestoneBlockIds, NextBlockIds, PeerRequest, Processed,
    Transactions, UnconfirmedTransactions,
};
use crate::NetworkError;

/// Decode a peer's JSON answer, surfacing `{"error": ..}` as [`NetworkError::Remote`].
pub fn decode_response<T: DeserializeOwned>(peer: &str, value: Value) -> Result<T, NetworkError> {
    if let Ok(ErrorResponse { error }) = serde_json::from_value::<ErrorResponse>(value.clone()) {
        return Err(NetworkError::Remote {
            peer: peer.to_string(),
            message: error,
        });
    }
    serde_json::from_value(value).map_err(|e| NetworkError::Malformed {
        peer: peer.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
pub trait Peer: Send + Sync {
    /// Stable `host:port` address identifying the peer.
    fn address(&self) -> &str;

    /// Send one request and wait for its JSON answer.
    async fn request(&self, request: PeerRequest) -> Result<Value, NetworkError>;

    async fn get_cumulative_difficulty(&self) -> Result<CumulativeDifficulty, NetworkError> {
        let value = self.request(PeerRequest::GetCumulativeDifficulty).await?;
        decode_response(self.address(), value)
    }

    async fn get_milestone_block_ids(
        &self,
        last_block_id: Option<BlockId>,
        last_milestone_block_id: Option<BlockId>,
    ) -> Result<MilestoneBlockIds, NetworkError> {
        let value = self
            .request(PeerRequest::GetMilestoneBlockIds {
                last_block_id,
                last_milestone_block_id,
            })
            .await?;
        decode_response(self.address(), value)
    }

    async fn get_next_block_ids(
        &self,
        block_id: BlockId,
        limit: u32,
    ) -> Result<Vec<BlockId>, NetworkError> {
        let value = self
            .request(PeerRequest::GetNextBlockIds { block_id, limit })
            .await?;
        decode_response::<NextBlockIds>(self.address(), value).map(|r| r.next_block_ids)
    }

    async fn get_next_blocks(&self, block_id: BlockId, limit: u32) -> Result<Vec<Block>, NetworkError> {
        let value = self
            .request(PeerRequest::GetNextBlocks { block_id, limit })
            .await?;
        decode_response(self.address(), value)
    }

    async fn get_unconfirmed_transactions(
        &self,
        exclude: Vec<TransactionId>,
    ) -> Result<Vec<Transaction>, NetworkError> {
        let value = self
            .request(PeerRequest::GetUnconfirmedTransactions { exclude })
            .await?;
        decode_response::<UnconfirmedTransactions>(self.address(), value)
            .map(|r| r.unconfirmed_transactions)
    }

    async fn get_transactions(
        &self,
        transaction_ids: Vec<TransactionId>,
    ) -> Result<Vec<Transaction>, NetworkError> {
        let value = self
            .request(PeerRequest::GetTransactions { transaction_ids })
            .await?;
        decode_response::<Transactions>(self.address(), value).map(|r| r.transactions)
    }

    async fn send_block(&self, block: Block) -> Result<u32, NetworkError> {
        let value = self
            .request(PeerRequest::ProcessBlock {
                block: Box::new(block),
            })
            .await?;
        decode_response::<Processed>(self.address(), value).map(|r| r.accepted)
    }

    async fn send_transactions(&self, transactions: Vec<Transaction>) -> Result<u32, NetworkError> {
        let value = self
            .request(PeerRequest::ProcessTransactions { transactions })
            .await?;
        decode_response::<Processed>(self.address(), value).map(|r| r.accepted)
    }
}
