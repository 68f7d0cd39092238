//! Node lifecycle: workers start, relay, and stop on close.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use strata_network::{NetworkError, Peer, PeerRequest, PeerSet};
use strata_node::{ChainNode, NodeConfig};
use strata_nullables::{NullClock, NullStore};
use strata_store::ChainStore;
use strata_types::NetworkId;

use common::*;

/// Records what the node sends and reports an empty, lighter chain.
struct RecordingPeer {
    requests: Mutex<Vec<&'static str>>,
}

impl RecordingPeer {
    fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
        }
    }

    fn saw(&self, name: &str) -> bool {
        self.count(name) > 0
    }

    fn count(&self, name: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| **r == name).count()
    }
}

#[async_trait]
impl Peer for RecordingPeer {
    fn address(&self) -> &str {
        "10.0.0.5:7874"
    }

    async fn request(&self, request: PeerRequest) -> Result<Value, NetworkError> {
        self.requests.lock().unwrap().push(request.name());
        Ok(match request {
            PeerRequest::GetCumulativeDifficulty => {
                json!({"cumulativeDifficulty": "0", "blockchainHeight": 0})
            }
            PeerRequest::GetUnconfirmedTransactions { .. } => {
                json!({"unconfirmedTransactions": []})
            }
            PeerRequest::ProcessBlock { .. } | PeerRequest::ProcessTransactions { .. } => {
                json!({"accepted": 1})
            }
            _ => json!({"error": "unsupported"}),
        })
    }
}

async fn wait_for(peer: &RecordingPeer, name: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !peer.saw(name) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("peer never received {name}"));
}

fn config() -> NodeConfig {
    let mut config = NodeConfig::default().with_network(NetworkId::Dev);
    config.enable_metrics = true;
    config.sync_interval_ms = 50;
    config.waiting_drain_interval_ms = 50;
    config
}

#[tokio::test]
async fn workers_relay_and_stop_on_close() {
    let clock = Arc::new(NullClock::new(START_SECS));
    let store: Arc<dyn ChainStore> = Arc::new(NullStore::new());
    let peer = Arc::new(RecordingPeer::new());
    let mut peers = PeerSet::new(8, 600);
    peers.add(peer.clone());

    let mut node = ChainNode::with_options(config(), store, peers, options(&clock)).expect("node");
    let chain = Arc::clone(node.chain());
    let helper = TestChain {
        chain: Arc::clone(&chain),
        store: Arc::new(NullStore::new()),
        clock: Arc::clone(&clock),
    };
    chain
        .broadcast(helper.payment(&funded(), account(&keypair(2)), 10))
        .expect("admit");

    node.start();
    wait_for(&peer, "processTransactions").await;
    wait_for(&peer, "getCumulativeDifficulty").await;

    helper.produce(&keypair(1));
    wait_for(&peer, "processBlock").await;

    let metrics = node.metrics().expect("metrics enabled");
    assert_eq!(metrics.height.get(), 1);
    assert_eq!(metrics.blocks_pushed.get(), 1);
    assert!(metrics.encode().expect("encode").contains("blocks_pushed"));

    node.close().await;
    assert_eq!(chain.height(), 1);
}

#[tokio::test]
async fn node_reopens_its_store() {
    let clock = Arc::new(NullClock::new(START_SECS));
    let store = Arc::new(NullStore::new());
    let first = TestChain::with_store(Arc::clone(&store), Arc::clone(&clock));
    first.produce_n(&keypair(1), 3);
    let head = first.chain.last_block().id();

    let dyn_store: Arc<dyn ChainStore> = store;
    let mut node = ChainNode::with_options(
        config(),
        dyn_store,
        PeerSet::new(8, 600),
        options(&clock),
    )
    .expect("node");
    assert_eq!(node.chain().last_block().id(), head);

    node.start();
    node.close().await;
}

#[tokio::test]
async fn blocks_pushed_before_start_are_not_relayed() {
    let clock = Arc::new(NullClock::new(START_SECS));
    let store: Arc<dyn ChainStore> = Arc::new(NullStore::new());
    let peer = Arc::new(RecordingPeer::new());
    let mut peers = PeerSet::new(8, 600);
    peers.add(peer.clone());

    let mut node = ChainNode::with_options(config(), store, peers, options(&clock)).expect("node");
    let helper = TestChain {
        chain: Arc::clone(node.chain()),
        store: Arc::new(NullStore::new()),
        clock: Arc::clone(&clock),
    };
    helper.produce(&keypair(1));

    node.start();
    node.start();
    wait_for(&peer, "getCumulativeDifficulty").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!peer.saw("processBlock"));

    helper.produce(&keypair(1));
    wait_for(&peer, "processBlock").await;
    assert_eq!(peer.count("processBlock"), 1);
    node.close().await;
}
