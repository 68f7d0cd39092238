//! Connected peers, their reliability score, and the blacklist.

use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::peer::Peer;

/// Reasons a peer can be penalized. Each carries a fixed penalty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PenaltyReason {
    /// Fed a block the chain rejected.
    InvalidBlock,
    /// Answer did not decode or contradicted itself.
    Malformed,
    Timeout,
    /// Returned more items than requested. Blacklists immediately.
    Oversized,
}

impl PenaltyReason {
    pub fn penalty(self) -> i32 {
        match self {
            Self::InvalidBlock => -100,
            Self::Malformed => -50,
            Self::Timeout => -10,
            Self::Oversized => SCORE_MIN,
        }
    }
}

/// Score at or below which a peer is blacklisted.
const BLACKLIST_THRESHOLD: i32 = -200;
const SCORE_MIN: i32 = -1000;
const SCORE_MAX: i32 = 100;

struct PeerEntry {
    peer: Arc<dyn Peer>,
    connected: bool,
    score: i32,
    blacklisted_until: Option<u64>,
}

impl PeerEntry {
    fn selectable(&self) -> bool {
        self.connected && self.blacklisted_until.is_none()
    }

    /// Selection weight: every selectable peer keeps a non-zero chance.
    fn weight(&self) -> f64 {
        f64::from(self.score - SCORE_MIN + 1)
    }
}

/// Registry of peers the sync engine may talk to.
pub struct PeerSet {
    peers: HashMap<String, PeerEntry>,
    max_peers: usize,
    blacklist_secs: u64,
}

impl PeerSet {
    pub fn new(max_peers: usize, blacklist_secs: u64) -> Self {
        Self {
            peers: HashMap::new(),
            max_peers,
            blacklist_secs,
        }
    }

    /// Register a connected peer. When full, the lowest-scoring peer is
    /// evicted if it scores below a fresh peer. Returns whether the peer is
    /// now tracked.
    pub fn add(&mut self, peer: Arc<dyn Peer>) -> bool {
        let key = peer.address().to_string();
        if let Some(existing) = self.peers.get_mut(&key) {
            if existing.blacklisted_until.is_some() {
                return false;
            }
            existing.peer = peer;
            existing.connected = true;
            return true;
        }

        if self.peers.len() >= self.max_peers {
            let worst = self
                .peers
                .iter()
                .min_by_key(|(_, e)| e.score)
                .map(|(k, e)| (k.clone(), e.score));
            match worst {
                Some((worst_key, worst_score)) if worst_score < 0 => {
                    tracing::debug!(evicted = %worst_key, score = worst_score, "evicted lowest-scoring peer");
                    self.peers.remove(&worst_key);
                }
                _ => return false,
            }
        }

        self.peers.insert(
            key,
            PeerEntry {
                peer,
                connected: true,
                score: 0,
                blacklisted_until: None,
            },
        );
        true
    }

    pub fn remove(&mut self, address: &str) {
        self.peers.remove(address);
    }

    /// Stop selecting a peer until it is added again.
    pub fn disconnect(&mut self, address: &str) {
        if let Some(entry) = self.peers.get_mut(address) {
            entry.connected = false;
        }
    }

    pub fn connected_count(&self) -> usize {
        self.peers.values().filter(|e| e.selectable()).count()
    }

    /// Every peer slot is taken by a selectable peer.
    pub fn is_saturated(&self) -> bool {
        self.connected_count() >= self.max_peers
    }

    pub fn connected(&self) -> Vec<Arc<dyn Peer>> {
        self.peers
            .values()
            .filter(|e| e.selectable())
            .map(|e| e.peer.clone())
            .collect()
    }

    pub fn get(&self, address: &str) -> Option<Arc<dyn Peer>> {
        self.peers
            .get(address)
            .filter(|e| e.selectable())
            .map(|e| e.peer.clone())
    }

    pub fn score(&self, address: &str) -> Option<i32> {
        self.peers.get(address).map(|e| e.score)
    }

    pub fn is_blacklisted(&self, address: &str) -> bool {
        self.peers
            .get(address)
            .is_some_and(|e| e.blacklisted_until.is_some())
    }

    pub fn blacklist(&mut self, address: &str, now_secs: u64, cause: &str) {
        if let Some(entry) = self.peers.get_mut(address) {
            tracing::warn!(peer = %address, cause, "blacklisting peer");
            entry.blacklisted_until = Some(now_secs + self.blacklist_secs);
            entry.connected = false;
        }
    }

    /// Lower a peer's score. Returns `true` if it was blacklisted as a result.
    pub fn penalize(&mut self, address: &str, reason: PenaltyReason, now_secs: u64) -> bool {
        let Some(entry) = self.peers.get_mut(address) else {
            return false;
        };
        entry.score = (entry.score + reason.penalty()).max(SCORE_MIN);
        if entry.score <= BLACKLIST_THRESHOLD {
            self.blacklist(address, now_secs, &format!("{reason:?}"));
            return true;
        }
        tracing::debug!(peer = %address, ?reason, score = entry.score, "deprioritized peer");
        false
    }

    pub fn reward(&mut self, address: &str, amount: i32) {
        if let Some(entry) = self.peers.get_mut(address) {
            entry.score = (entry.score + amount).min(SCORE_MAX);
        }
    }

    /// Lift expired blacklistings. Lifted peers start over at score zero but
    /// stay disconnected until the transport adds them again.
    pub fn check_blacklist(&mut self, now_secs: u64) {
        for entry in self.peers.values_mut() {
            if entry.blacklisted_until.is_some_and(|until| now_secs >= until) {
                entry.blacklisted_until = None;
                entry.score = 0;
            }
        }
    }

    /// One peer chosen at random, weighted by reliability.
    pub fn pick_weighted(&self) -> Option<Arc<dyn Peer>> {
        let candidates: Vec<&PeerEntry> = self.peers.values().filter(|e| e.selectable()).collect();
        candidates
            .choose_weighted(&mut rand::thread_rng(), |e| e.weight())
            .ok()
            .map(|e| e.peer.clone())
    }

    /// Up to `count` distinct peers not named in `exclude`, weighted by
    /// reliability.
    pub fn pick_distinct(&self, count: usize, exclude: &[&str]) -> Vec<Arc<dyn Peer>> {
        let candidates: Vec<&PeerEntry> = self
            .peers
            .iter()
            .filter(|(k, e)| e.selectable() && !exclude.contains(&k.as_str()))
            .map(|(_, e)| e)
            .collect();
        match candidates.choose_multiple_weighted(&mut rand::thread_rng(), count, |e| e.weight()) {
            Ok(chosen) => chosen.map(|e| e.peer.clone()).collect(),
            Err(_) => Vec::new(),
        }
    }
}
