//! Applying a downloaded chain segment, switching forks when it is heavier.

use std::sync::Arc;

use tracing::{info, warn};

use strata_ledger::Block;
use strata_types::BlockId;

use crate::chain::Chain;
use crate::error::ChainError;

/// Result of applying blocks received from a peer.
#[derive(Debug)]
pub struct ForkOutcome {
    /// Blocks of the peer's chain now on our chain.
    pub pushed: usize,
    /// Our blocks above the common block, detached while trying the fork.
    pub replaced: Vec<Arc<Block>>,
    /// The first block that failed, if any.
    pub rejected: Option<ChainError>,
    /// Whether our original blocks were restored.
    pub restored: bool,
}

impl ForkOutcome {
    pub fn reorganized(&self) -> bool {
        !self.replaced.is_empty() && !self.restored
    }
}

impl Chain {
    /// Attach `blocks`, which continue the chain at `common`.
    ///
    /// When `common` is below the head, our blocks above it are popped off
    /// first. The result is kept only if it is strictly heavier than the
    /// chain we had; otherwise our blocks are pushed back and the fork's
    /// transactions go to the waiting queue.
    pub fn process_fork(
        &self,
        common: BlockId,
        blocks: Vec<Block>,
    ) -> Result<ForkOutcome, ChainError> {
        let mut state = self.write();
        let Some(common_block) = self.store.block(common)? else {
            return Ok(ForkOutcome {
                pushed: 0,
                replaced: Vec::new(),
                rejected: None,
                restored: false,
            });
        };
        let original_difficulty = state.last_block.cumulative_difficulty;
        let popped = self.pop_off_locked(&mut state, common_block.height)?;

        let mut pushed = 0;
        let mut rejected = None;
        for block in blocks {
            match self.push_locked(&mut state, block) {
                Ok(_) => pushed += 1,
                Err(e @ (ChainError::Storage(_) | ChainError::Rollback(_) | ChainError::Ledger(_))) => {
                    return Err(e)
                }
                Err(e) => {
                    self.log_rejection("peer", &e);
                    rejected = Some(e);
                    break;
                }
            }
        }

        let heavier = state.last_block.cumulative_difficulty > original_difficulty;
        if popped.is_empty() || heavier {
            if !popped.is_empty() {
                info!(
                    common = common_block.height,
                    height = state.last_block.height,
                    replaced = popped.len(),
                    "switched to heavier fork"
                );
            }
            return Ok(ForkOutcome {
                pushed,
                replaced: popped,
                rejected,
                restored: false,
            });
        }

        warn!(
            common = common_block.height,
            pushed, "fork is not heavier, restoring our blocks"
        );
        self.pop_off_locked(&mut state, common_block.height)?;
        for block in &popped {
            self.push_locked(&mut state, (**block).clone())?;
        }
        Ok(ForkOutcome {
            pushed: 0,
            replaced: popped,
            rejected,
            restored: true,
        })
    }
}
