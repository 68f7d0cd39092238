//! Answers peer requests from the local chain.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use strata_ledger::Block;
use strata_network::NetworkError;
use strata_network::wire::{
    CumulativeDifficulty, ErrorResponse, MilestoneBlockIds, NextBlockIds, PeerRequest, Processed,
    Transactions, UnconfirmedTransactions,
};
use strata_types::{BlockId, TransactionId};

use crate::admission::PeerTransactionOutcome;
use crate::chain::Chain;
use crate::error::ChainError;
use crate::tracing_spans::peer_request_span;

/// Most milestone ids returned per request.
const MAX_MILESTONES: usize = 10;

/// Largest stride between milestones.
const MAX_MILESTONE_JUMP: u32 = 1440;

/// Stride used when walking back from our own head.
const HEAD_MILESTONE_JUMP: u32 = 10;

pub struct PeerRequestHandler {
    chain: Arc<Chain>,
    max_block_ids: u32,
}

impl PeerRequestHandler {
    pub fn new(chain: Arc<Chain>, max_block_ids: u32) -> Self {
        Self {
            chain,
            max_block_ids,
        }
    }

    /// Handle a raw JSON request. Every failure becomes `{"error": ..}`.
    pub fn handle_json(&self, request: Value) -> Value {
        match serde_json::from_value::<PeerRequest>(request) {
            Ok(request) => self.handle(request),
            Err(e) => error_value(format!("malformed request: {e}")),
        }
    }

    pub fn handle(&self, request: PeerRequest) -> Value {
        let span = peer_request_span(request.name());
        let _enter = span.enter();
        let result = match request {
            PeerRequest::GetCumulativeDifficulty => to_value(self.cumulative_difficulty()),
            PeerRequest::GetMilestoneBlockIds {
                last_block_id,
                last_milestone_block_id,
            } => self
                .milestone_block_ids(last_block_id, last_milestone_block_id)
                .and_then(to_value),
            PeerRequest::GetNextBlockIds { block_id, limit } => self
                .next_block_ids(block_id, limit)
                .and_then(|next_block_ids| to_value(NextBlockIds { next_block_ids })),
            PeerRequest::GetNextBlocks { block_id, limit } => {
                self.next_blocks(block_id, limit).and_then(to_value)
            }
            PeerRequest::GetUnconfirmedTransactions { exclude } => {
                to_value(self.unconfirmed_transactions(&exclude))
            }
            PeerRequest::GetTransactions { transaction_ids } => {
                self.transactions(&transaction_ids).and_then(to_value)
            }
            PeerRequest::ProcessBlock { block } => to_value(self.process_block(*block)),
            PeerRequest::ProcessTransactions { transactions } => {
                let accepted = self
                    .chain
                    .process_peer_transactions(transactions)
                    .iter()
                    .filter(|(_, outcome)| *outcome == PeerTransactionOutcome::Admitted)
                    .count();
                to_value(Processed {
                    accepted: u32::try_from(accepted).unwrap_or(u32::MAX),
                })
            }
        };
        result.unwrap_or_else(|e| {
            debug!(error = %e, "peer request failed");
            error_value(e.to_string())
        })
    }

    pub fn cumulative_difficulty(&self) -> CumulativeDifficulty {
        let head = self.chain.last_block();
        CumulativeDifficulty {
            cumulative_difficulty: head.cumulative_difficulty,
            blockchain_height: head.height,
        }
    }

    /// Sparse ids walking back towards genesis, for the requester's
    /// common-ancestor search.
    pub fn milestone_block_ids(
        &self,
        last_block_id: Option<BlockId>,
        last_milestone_block_id: Option<BlockId>,
    ) -> Result<MilestoneBlockIds, ChainError> {
        if let Some(last) = last_block_id {
            if self.chain.has_block(last)? {
                return Ok(MilestoneBlockIds {
                    milestone_block_ids: vec![last],
                    last: true,
                });
            }
        }

        let head_height = self.chain.height();
        let (mut height, jump) = match (last_milestone_block_id, last_block_id) {
            (Some(milestone), _) => {
                let block = self.chain.block(milestone)?.ok_or_else(|| {
                    ChainError::Peer(NetworkError::Inconsistent {
                        peer: String::new(),
                        reason: format!("unknown milestone block {milestone}"),
                    })
                })?;
                let jump = head_height
                    .saturating_sub(block.height)
                    .clamp(1, MAX_MILESTONE_JUMP);
                (block.height.saturating_sub(jump), jump)
            }
            (None, Some(_)) => (head_height, HEAD_MILESTONE_JUMP),
            (None, None) => {
                return Err(ChainError::Peer(NetworkError::Malformed {
                    peer: String::new(),
                    reason: "neither lastBlockId nor lastMilestoneBlockId given".into(),
                }))
            }
        };

        let mut milestone_block_ids = Vec::with_capacity(MAX_MILESTONES);
        loop {
            if let Some(id) = self.chain.block_id_at_height(height)? {
                milestone_block_ids.push(id);
            }
            if height == 0 || milestone_block_ids.len() >= MAX_MILESTONES {
                break;
            }
            height = height.saturating_sub(jump);
        }
        Ok(MilestoneBlockIds {
            milestone_block_ids,
            last: false,
        })
    }

    pub fn next_block_ids(&self, block_id: BlockId, limit: u32) -> Result<Vec<BlockId>, ChainError> {
        self.chain
            .block_ids_after(block_id, limit.min(self.max_block_ids) as usize)
    }

    pub fn next_blocks(&self, block_id: BlockId, limit: u32) -> Result<Vec<Block>, ChainError> {
        self.chain
            .blocks_after(block_id, limit.min(self.max_block_ids) as usize)
    }

    pub fn unconfirmed_transactions(&self, exclude: &[TransactionId]) -> UnconfirmedTransactions {
        let unconfirmed_transactions = self
            .chain
            .unconfirmed_transactions()
            .into_iter()
            .filter(|tx| !exclude.contains(&tx.id()))
            .collect();
        UnconfirmedTransactions {
            unconfirmed_transactions,
        }
    }

    pub fn transactions(&self, ids: &[TransactionId]) -> Result<Transactions, ChainError> {
        let mut transactions = Vec::with_capacity(ids.len());
        for id in ids.iter().take(self.max_block_ids as usize) {
            if let Some(tx) = self.chain.transaction(*id)? {
                transactions.push(tx);
            }
        }
        Ok(Transactions { transactions })
    }

    /// A block pushed to us by a peer. Only blocks extending our head are
    /// considered; anything else waits for sync.
    pub fn process_block(&self, block: Block) -> Processed {
        if block.previous_block_id != self.chain.last_block().id() {
            return Processed { accepted: 0 };
        }
        match self.chain.push_block(block) {
            Ok(_) => Processed { accepted: 1 },
            Err(e) => {
                self.chain.log_rejection("peer push", &e);
                Processed { accepted: 0 }
            }
        }
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, ChainError> {
    serde_json::to_value(value).map_err(|e| {
        ChainError::Peer(NetworkError::Encoding(e.to_string()))
    })
}

fn error_value(error: String) -> Value {
    serde_json::to_value(ErrorResponse { error: error.clone() })
        .unwrap_or_else(|_| Value::String(error))
}
