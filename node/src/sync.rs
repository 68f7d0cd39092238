//! Sync: find a heavier chain among peers, download it, and hand it to
//! fork processing.
//!
//! One iteration picks a feeder peer weighted by reliability, searches for
//! the common block through sparse milestones, lists the feeder's block ids
//! after it, downloads them in segments spread over several peers, and
//! applies the result with [`Chain::process_fork`]. Deep reorgs must first
//! be confirmed by other peers.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{debug, info, warn, Instrument};

use strata_ledger::Block;
use strata_network::{NetworkError, PeerSet, PenaltyReason, Peer};
use strata_types::BlockId;

use crate::chain::Chain;
use crate::config::SyncConfig;
use crate::error::ChainError;
use crate::fork::ForkOutcome;
use crate::metrics::ChainMetrics;
use crate::shutdown::ShutdownSignal;
use crate::tracing_spans::{segment_span, sync_span};

/// Most milestone ids a peer may send in one answer.
const MAX_MILESTONE_IDS: usize = 20;

/// Downloads with at least this many segments may cost the slowest peer
/// its slot.
const LARGE_DOWNLOAD_SEGMENTS: usize = 4;

/// How one sync iteration ended.
#[derive(Debug)]
pub enum SyncOutcome {
    Paused,
    NotEnoughPeers,
    /// The feeder's chain is not heavier than ours.
    UpToDate { peer: String },
    /// A deep fork did not gather enough confirmations.
    Unconfirmed { peer: String, confirmations: usize },
    /// The iteration stopped on a peer failure or an unusable fork.
    Abandoned { peer: String, error: ChainError },
    Applied { peer: String, fork: ForkOutcome },
}

pub struct SyncEngine {
    chain: Arc<Chain>,
    peers: Arc<Mutex<PeerSet>>,
    config: SyncConfig,
    keep_syncing: AtomicBool,
    iteration: tokio::sync::Mutex<()>,
    metrics: Option<Arc<ChainMetrics>>,
}

impl SyncEngine {
    pub fn new(chain: Arc<Chain>, peers: Arc<Mutex<PeerSet>>, config: SyncConfig) -> Self {
        Self {
            chain,
            peers,
            config,
            keep_syncing: AtomicBool::new(true),
            iteration: tokio::sync::Mutex::new(()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ChainMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn peers(&self) -> MutexGuard<'_, PeerSet> {
        self.peers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stop starting new iterations. In-flight downloads finish.
    pub fn pause(&self) {
        self.keep_syncing.store(false, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.keep_syncing.store(true, Ordering::SeqCst);
    }

    pub fn is_syncing(&self) -> bool {
        self.keep_syncing.load(Ordering::SeqCst)
    }

    /// Run iterations every `interval` until shutdown.
    pub async fn run(&self, mut shutdown: ShutdownSignal, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.triggered() => {
                    debug!("sync loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sync_once().await {
                        Ok(SyncOutcome::Applied { peer, fork }) => {
                            info!(%peer, pushed = fork.pushed, reorganized = fork.reorganized(), "sync applied blocks");
                        }
                        Ok(outcome) => debug!(?outcome, "sync iteration"),
                        Err(e) => warn!(error = %e, "sync iteration failed"),
                    }
                }
            }
        }
    }

    /// One sync iteration. Peer failures end the iteration with
    /// [`SyncOutcome::Abandoned`]; only local failures are returned as errors.
    pub async fn sync_once(&self) -> Result<SyncOutcome, ChainError> {
        if !self.is_syncing() {
            return Ok(SyncOutcome::Paused);
        }
        let _iteration = self.iteration.lock().await;
        let started = Instant::now();

        let feeder = {
            let mut peers = self.peers();
            peers.check_blacklist(self.now_secs());
            if peers.connected_count() < self.config.min_connected_peers {
                return Ok(SyncOutcome::NotEnoughPeers);
            }
            match peers.pick_weighted() {
                Some(peer) => peer,
                None => return Ok(SyncOutcome::NotEnoughPeers),
            }
        };
        let address = feeder.address().to_string();
        let outcome = self
            .sync_with(&feeder)
            .instrument(sync_span(&address))
            .await;

        if let Some(metrics) = &self.metrics {
            metrics.sync_iterations.inc();
            metrics
                .sync_time_ms
                .observe(started.elapsed().as_secs_f64() * 1000.0);
        }

        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(ChainError::Peer(e)) => {
                self.handle_peer_error(&e);
                Ok(SyncOutcome::Abandoned {
                    peer: address,
                    error: ChainError::Peer(e),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn sync_with(&self, feeder: &Arc<dyn Peer>) -> Result<SyncOutcome, ChainError> {
        let address = feeder.address().to_string();
        let remote = self
            .with_timeout(&address, feeder.get_cumulative_difficulty())
            .await?;
        let local = self.chain.last_block();
        if remote.cumulative_difficulty <= local.cumulative_difficulty {
            return Ok(SyncOutcome::UpToDate { peer: address });
        }
        debug!(
            remote_height = remote.blockchain_height,
            local_height = local.height,
            "peer has a heavier chain"
        );

        let Some(milestone) = self.common_milestone(feeder).await? else {
            return Err(ChainError::Peer(NetworkError::Inconsistent {
                peer: address,
                reason: "no common milestone".into(),
            }));
        };
        let (common, fork_ids) = self.common_block(feeder, milestone).await?;
        if fork_ids.is_empty() {
            return Ok(SyncOutcome::UpToDate { peer: address });
        }

        let common_height = match self.chain.block(common)? {
            Some(block) => block.height,
            None => return Ok(SyncOutcome::UpToDate { peer: address }),
        };
        let head = self.chain.last_block();
        let depth = head.height.saturating_sub(common_height);
        if depth > self.chain.params().max_rollback {
            warn!(depth, common_height, "fork below rollback limit, ignoring");
            return Ok(SyncOutcome::Abandoned {
                peer: address,
                error: ChainError::ReplayDivergence {
                    height: common_height,
                    reason: format!("fork is {depth} blocks deep"),
                },
            });
        }
        if depth > self.config.confirmation_window {
            let confirmations = self.confirm_fork(feeder, common, fork_ids[0]).await;
            if confirmations < self.config.fork_confirmations {
                info!(depth, confirmations, "deep fork not confirmed by other peers");
                return Ok(SyncOutcome::Unconfirmed {
                    peer: address,
                    confirmations,
                });
            }
        }

        let blocks = self.download(feeder, common, &fork_ids).await;
        if blocks.is_empty() {
            return Err(ChainError::Peer(NetworkError::Inconsistent {
                peer: address,
                reason: "no blocks after the common block".into(),
            }));
        }

        let fork = self.chain.process_fork(common, blocks)?;
        if let Some(rejected) = &fork.rejected {
            if let Some(metrics) = &self.metrics {
                metrics.blocks_rejected.inc();
            }
            if rejected.is_peer_fault() {
                self.peers()
                    .blacklist(&address, self.now_secs(), &rejected.to_string());
            }
        } else {
            self.peers().reward(&address, 1);
        }
        if fork.reorganized() {
            if let Some(metrics) = &self.metrics {
                metrics.reorgs.inc();
            }
        }
        Ok(SyncOutcome::Applied {
            peer: address,
            fork,
        })
    }

    /// Walk the feeder's milestones back until one is on our chain.
    async fn common_milestone(&self, feeder: &Arc<dyn Peer>) -> Result<Option<BlockId>, ChainError> {
        let address = feeder.address().to_string();
        let head = self.chain.last_block().id();
        let mut last_milestone = None;
        for _ in 0..self.config.max_milestone_rounds {
            let answer = self
                .with_timeout(
                    &address,
                    feeder.get_milestone_block_ids(Some(head), last_milestone),
                )
                .await?;
            let ids = answer.milestone_block_ids;
            if ids.len() > MAX_MILESTONE_IDS {
                return Err(ChainError::Peer(NetworkError::Oversized {
                    peer: address,
                    len: ids.len(),
                    max: MAX_MILESTONE_IDS,
                }));
            }
            for id in &ids {
                if self.chain.has_block(*id)? {
                    return Ok(Some(*id));
                }
            }
            if answer.last {
                return Ok(None);
            }
            match ids.last() {
                Some(id) => last_milestone = Some(*id),
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Refine a known milestone to the last block both chains share.
    /// Returns it with the feeder's block ids that follow it.
    async fn common_block(
        &self,
        feeder: &Arc<dyn Peer>,
        milestone: BlockId,
    ) -> Result<(BlockId, Vec<BlockId>), ChainError> {
        let address = feeder.address().to_string();
        let max = self.config.max_block_ids;
        let mut common = milestone;
        for _ in 0..self.config.max_milestone_rounds {
            let ids = self
                .with_timeout(&address, feeder.get_next_block_ids(common, max))
                .await?;
            if ids.len() > max as usize {
                return Err(ChainError::Peer(NetworkError::Oversized {
                    peer: address,
                    len: ids.len(),
                    max: max as usize,
                }));
            }
            let mut known = 0;
            while known < ids.len() && self.chain.has_block(ids[known])? {
                known += 1;
            }
            if known > 0 {
                common = ids[known - 1];
            }
            if known < ids.len() || ids.is_empty() {
                return Ok((common, ids[known..].to_vec()));
            }
        }
        Ok((common, Vec::new()))
    }

    /// Ask other peers whether they follow the same fork from `common`.
    async fn confirm_fork(&self, feeder: &Arc<dyn Peer>, common: BlockId, first: BlockId) -> usize {
        let local = self.chain.cumulative_difficulty();
        let others = self
            .peers()
            .pick_distinct(self.config.fork_confirmations, &[feeder.address()]);
        let mut confirmations = 0;
        for peer in others {
            let address = peer.address().to_string();
            let heavier = match self
                .with_timeout(&address, peer.get_cumulative_difficulty())
                .await
            {
                Ok(remote) => remote.cumulative_difficulty > local,
                Err(ChainError::Peer(e)) => {
                    self.handle_peer_error(&e);
                    continue;
                }
                Err(_) => continue,
            };
            if !heavier {
                continue;
            }
            match self
                .with_timeout(&address, peer.get_next_block_ids(common, 1))
                .await
            {
                Ok(ids) if ids.first() == Some(&first) => confirmations += 1,
                Ok(_) => debug!(peer = %address, "peer follows a different fork"),
                Err(ChainError::Peer(e)) => self.handle_peer_error(&e),
                Err(_) => {}
            }
        }
        confirmations
    }

    /// Fetch the blocks for `ids` in segments, spread over the feeder and
    /// other peers. Segments that fail are retried from the feeder. Returns
    /// the longest contiguous prefix obtained.
    async fn download(&self, feeder: &Arc<dyn Peer>, common: BlockId, ids: &[BlockId]) -> Vec<Block> {
        let segment_size = self.config.segment_size.max(1) as usize;
        let segments: Vec<(BlockId, Vec<BlockId>)> = ids
            .chunks(segment_size)
            .enumerate()
            .map(|(i, chunk)| {
                let start = if i == 0 { common } else { ids[i * segment_size - 1] };
                (start, chunk.to_vec())
            })
            .collect();

        let mut assigned: Vec<Arc<dyn Peer>> = vec![Arc::clone(feeder)];
        assigned.extend(
            self.peers()
                .pick_distinct(segments.len().saturating_sub(1), &[feeder.address()]),
        );

        let timeout = self.request_timeout();
        let mut tasks = JoinSet::new();
        for (index, (start, segment)) in segments.iter().enumerate() {
            let peer = Arc::clone(&assigned[index % assigned.len()]);
            let start = *start;
            let count = segment.len();
            let span = segment_span(peer.address(), start, count);
            tasks.spawn(
                async move {
                    let began = Instant::now();
                    let result = fetch_segment(peer.as_ref(), start, count, timeout).await;
                    (index, peer.address().to_string(), began.elapsed(), result)
                }
                .instrument(span),
            );
        }

        let mut fetched: Vec<Option<Vec<Block>>> = vec![None; segments.len()];
        let mut slowest: Option<(String, Duration)> = None;
        while let Some(joined) = tasks.join_next().await {
            let Ok((index, address, elapsed, result)) = joined else {
                continue;
            };
            match result.and_then(|blocks| check_segment(&address, &segments[index].1, blocks)) {
                Ok(blocks) => {
                    if slowest.as_ref().map_or(true, |(_, worst)| elapsed > *worst) {
                        slowest = Some((address, elapsed));
                    }
                    fetched[index] = Some(blocks);
                }
                Err(e) => {
                    debug!(peer = %address, error = %e, "segment failed, retrying from feeder");
                    self.handle_peer_error(&e);
                }
            }
        }

        let mut blocks = Vec::with_capacity(ids.len());
        for ((start, segment), result) in segments.iter().zip(fetched) {
            let segment_blocks = match result {
                Some(found) => found,
                None => {
                    let retried = fetch_segment(feeder.as_ref(), *start, segment.len(), timeout)
                        .await
                        .and_then(|found| check_segment(feeder.address(), segment, found));
                    match retried {
                        Ok(found) => found,
                        Err(e) => {
                            self.handle_peer_error(&e);
                            break;
                        }
                    }
                }
            };
            let complete = segment_blocks.len() == segment.len();
            blocks.extend(segment_blocks);
            if !complete {
                break;
            }
        }

        if segments.len() >= LARGE_DOWNLOAD_SEGMENTS {
            if let Some((address, elapsed)) = slowest {
                let mut peers = self.peers();
                if address != feeder.address() && peers.is_saturated() {
                    info!(peer = %address, ?elapsed, "disconnecting slowest peer");
                    peers.disconnect(&address);
                }
            }
        }
        blocks
    }

    async fn with_timeout<T>(
        &self,
        peer: &str,
        request: impl Future<Output = Result<T, NetworkError>>,
    ) -> Result<T, ChainError> {
        match tokio::time::timeout(self.request_timeout(), request).await {
            Ok(result) => result.map_err(ChainError::Peer),
            Err(_) => Err(ChainError::Peer(NetworkError::Timeout {
                peer: peer.to_string(),
            })),
        }
    }

    /// Score a failed request against the peer it came from.
    fn handle_peer_error(&self, error: &NetworkError) {
        let Some(address) = error.peer() else {
            return;
        };
        let now = self.now_secs();
        let mut peers = self.peers();
        match error {
            NetworkError::Timeout { .. } => {
                peers.penalize(address, PenaltyReason::Timeout, now);
            }
            NetworkError::Oversized { .. } => {
                peers.penalize(address, PenaltyReason::Oversized, now);
            }
            NetworkError::Malformed { .. } | NetworkError::Inconsistent { .. } => {
                peers.penalize(address, PenaltyReason::Malformed, now);
            }
            NetworkError::Disconnected(_) => peers.disconnect(address),
            NetworkError::Remote { .. } | NetworkError::Encoding(_) => {}
        }
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.config.request_timeout_ms)
    }

    fn now_secs(&self) -> u64 {
        self.chain.now().as_secs()
    }
}

async fn fetch_segment(
    peer: &dyn Peer,
    start: BlockId,
    count: usize,
    timeout: Duration,
) -> Result<Vec<Block>, NetworkError> {
    let limit = u32::try_from(count).unwrap_or(u32::MAX);
    match tokio::time::timeout(timeout, peer.get_next_blocks(start, limit)).await {
        Ok(result) => result,
        Err(_) => Err(NetworkError::Timeout {
            peer: peer.address().to_string(),
        }),
    }
}

/// A segment answer must be a prefix of the ids we asked for.
fn check_segment(peer: &str, expected: &[BlockId], blocks: Vec<Block>) -> Result<Vec<Block>, NetworkError> {
    if blocks.len() > expected.len() {
        return Err(NetworkError::Oversized {
            peer: peer.to_string(),
            len: blocks.len(),
            max: expected.len(),
        });
    }
    if blocks.is_empty() && !expected.is_empty() {
        return Err(NetworkError::Inconsistent {
            peer: peer.to_string(),
            reason: "empty segment".into(),
        });
    }
    for (block, id) in blocks.iter().zip(expected) {
        if block.id() != *id {
            return Err(NetworkError::Inconsistent {
                peer: peer.to_string(),
                reason: format!("expected block {id}, got {}", block.id()),
            });
        }
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_ledger::Genesis;
    use strata_types::AccountId;

    #[test]
    fn oversized_segments_are_rejected() {
        let genesis = Genesis::single(AccountId::new(1), 10).block();
        let err = check_segment("p:1", &[], vec![genesis]).unwrap_err();
        assert!(matches!(err, NetworkError::Oversized { .. }));
    }

    #[test]
    fn empty_segment_is_inconsistent() {
        let err = check_segment("p:1", &[BlockId::new(3)], Vec::new()).unwrap_err();
        assert!(err.is_misbehaviour());
    }
}
