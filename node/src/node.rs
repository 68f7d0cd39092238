//! The node service: one [`Chain`], its sync engine, and the periodic
//! workers around them.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use strata_ledger::Block;
use strata_network::PeerSet;
use strata_store::ChainStore;

use crate::chain::{Chain, ChainOptions};
use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::events::{ChainEvent, ChainEventKind};
use crate::metrics::ChainMetrics;
use crate::peer_api::PeerRequestHandler;
use crate::shutdown::ShutdownController;
use crate::sync::SyncEngine;

/// Timeout for waiting on workers during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ChainNode {
    config: NodeConfig,
    chain: Arc<Chain>,
    sync: Arc<SyncEngine>,
    handler: Arc<PeerRequestHandler>,
    metrics: Option<Arc<ChainMetrics>>,
    pub shutdown: Arc<ShutdownController>,
    started: bool,
    /// Handles for spawned workers (joined during close).
    task_handles: Vec<JoinHandle<()>>,
}

impl ChainNode {
    pub fn new(
        config: NodeConfig,
        store: Arc<dyn ChainStore>,
        peers: PeerSet,
    ) -> Result<Self, NodeError> {
        let options = ChainOptions::from_config(&config);
        Self::with_options(config, store, peers, options)
    }

    /// Build the node around explicitly assembled chain options, e.g. with
    /// a test clock or extra derived state.
    pub fn with_options(
        config: NodeConfig,
        store: Arc<dyn ChainStore>,
        peers: PeerSet,
        options: ChainOptions,
    ) -> Result<Self, NodeError> {
        let events = Arc::clone(&options.events);
        let metrics = if config.enable_metrics {
            let metrics = Arc::new(ChainMetrics::new()?);
            metrics.attach(&events);
            Some(metrics)
        } else {
            None
        };

        let chain = Arc::new(Chain::open(store, options)?);
        info!(
            network = config.network.as_str(),
            height = chain.height(),
            head = %chain.last_block().id(),
            "chain opened"
        );

        let mut sync = SyncEngine::new(
            Arc::clone(&chain),
            Arc::new(Mutex::new(peers)),
            config.sync.clone(),
        );
        if let Some(metrics) = &metrics {
            sync = sync.with_metrics(Arc::clone(metrics));
        }
        let handler = Arc::new(PeerRequestHandler::new(
            Arc::clone(&chain),
            config.sync.max_block_ids,
        ));

        Ok(Self {
            config,
            chain,
            sync: Arc::new(sync),
            handler,
            metrics,
            shutdown: Arc::new(ShutdownController::new()),
            started: false,
            task_handles: Vec::new(),
        })
    }

    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }

    pub fn sync(&self) -> &Arc<SyncEngine> {
        &self.sync
    }

    pub fn handler(&self) -> &Arc<PeerRequestHandler> {
        &self.handler
    }

    pub fn metrics(&self) -> Option<&Arc<ChainMetrics>> {
        self.metrics.as_ref()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Spawn the periodic workers. Calling it twice is a no-op.
    pub fn start(&mut self) {
        if self.started {
            warn!("node already started");
            return;
        }
        self.started = true;
        let config = self.config.clone();
        let request_timeout = Duration::from_millis(config.sync.request_timeout_ms);

        let sync = Arc::clone(&self.sync);
        let shutdown_rx = self.shutdown.subscribe();
        let interval = Duration::from_millis(config.sync_interval_ms);
        self.task_handles
            .push(tokio::spawn(async move { sync.run(shutdown_rx, interval).await }));

        let chain = Arc::clone(&self.chain);
        self.spawn_periodic("trim", Duration::from_secs(config.trim_interval_secs), move || {
            let chain = Arc::clone(&chain);
            async move {
                if let Some(height) = chain.trim() {
                    debug!(height, "trimmed derived state");
                }
            }
        });

        let chain = Arc::clone(&self.chain);
        self.spawn_periodic(
            "expiry_sweep",
            Duration::from_secs(config.expiry_sweep_interval_secs),
            move || {
                let chain = Arc::clone(&chain);
                async move {
                    if let Err(e) = chain.sweep_expired() {
                        warn!(error = %e, "expiry sweep failed");
                    }
                }
            },
        );

        let chain = Arc::clone(&self.chain);
        let sync = Arc::clone(&self.sync);
        self.spawn_periodic(
            "rebroadcast",
            Duration::from_secs(config.rebroadcast_interval_secs),
            move || {
                let chain = Arc::clone(&chain);
                let sync = Arc::clone(&sync);
                async move {
                    let transactions = chain.broadcasted_transactions();
                    if transactions.is_empty() {
                        return;
                    }
                    let peers = sync.peers().connected();
                    for peer in peers {
                        let sent = tokio::time::timeout(
                            request_timeout,
                            peer.send_transactions(transactions.clone()),
                        )
                        .await;
                        if !matches!(sent, Ok(Ok(_))) {
                            debug!(peer = peer.address(), "rebroadcast failed");
                        }
                    }
                }
            },
        );

        let chain = Arc::clone(&self.chain);
        let sync = Arc::clone(&self.sync);
        self.spawn_periodic(
            "peer_pull",
            Duration::from_secs(config.peer_pull_interval_secs),
            move || {
                let chain = Arc::clone(&chain);
                let sync = Arc::clone(&sync);
                async move {
                    let picked = sync.peers().pick_weighted();
                    let Some(peer) = picked else {
                        return;
                    };
                    let exclude = chain.unconfirmed_transaction_ids();
                    match tokio::time::timeout(
                        request_timeout,
                        peer.get_unconfirmed_transactions(exclude),
                    )
                    .await
                    {
                        Ok(Ok(transactions)) if !transactions.is_empty() => {
                            let outcomes = chain.process_peer_transactions(transactions);
                            debug!(peer = peer.address(), offered = outcomes.len(), "pulled transactions");
                        }
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => debug!(peer = peer.address(), error = %e, "transaction pull failed"),
                        Err(_) => debug!(peer = peer.address(), "transaction pull timed out"),
                    }
                }
            },
        );

        let chain = Arc::clone(&self.chain);
        let metrics = self.metrics.clone();
        self.spawn_periodic(
            "waiting_drain",
            Duration::from_millis(config.waiting_drain_interval_ms),
            move || {
                let chain = Arc::clone(&chain);
                let metrics = metrics.clone();
                async move {
                    if let Err(e) = chain.drain_waiting() {
                        warn!(error = %e, "waiting queue drain failed");
                    }
                    if let Some(metrics) = metrics {
                        let (admitted, waiting) = chain.pool_sizes();
                        metrics.observe_pool(admitted, waiting);
                    }
                }
            },
        );

        self.spawn_relay(request_timeout);
        info!(workers = self.task_handles.len(), "node started");
    }

    /// Forward freshly pushed blocks to connected peers. Blocks older than
    /// the relay window (replayed or synced history) are not relayed.
    fn spawn_relay(&mut self, timeout: Duration) {
        let (relay_tx, mut relay_rx) = mpsc::unbounded_channel::<Arc<Block>>();
        self.chain
            .events()
            .subscribe(ChainEventKind::BlockPushed, move |event| {
                if let ChainEvent::BlockPushed(block) = event {
                    let _ = relay_tx.send(Arc::clone(block));
                }
            });

        let chain = Arc::clone(&self.chain);
        let sync = Arc::clone(&self.sync);
        let mut shutdown = self.shutdown.subscribe();
        let window = chain.params().relay_window_secs;
        let handle = tokio::spawn(async move {
            loop {
                let block = tokio::select! {
                    _ = shutdown.triggered() => break,
                    block = relay_rx.recv() => match block {
                        Some(block) => block,
                        None => break,
                    },
                };
                if block.timestamp.elapsed_since(chain.now()) > window {
                    continue;
                }
                let peers = sync.peers().connected();
                for peer in peers {
                    let sent =
                        tokio::time::timeout(timeout, peer.send_block((*block).clone())).await;
                    if !matches!(sent, Ok(Ok(_))) {
                        debug!(peer = peer.address(), block = %block.id(), "block relay failed");
                    }
                }
            }
            debug!(worker = "relay", "worker stopping");
        });
        self.task_handles.push(handle);
    }

    fn spawn_periodic<F, Fut>(&mut self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
            loop {
                tokio::select! {
                    _ = shutdown.triggered() => {
                        debug!(worker = name, "worker stopping");
                        break;
                    }
                    _ = interval.tick() => tick().await,
                }
            }
        });
        self.task_handles.push(handle);
    }

    /// Signal shutdown and wait for every worker to stop.
    pub async fn close(&mut self) {
        self.sync.pause();
        self.shutdown.shutdown();
        for handle in self.task_handles.drain(..) {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "worker panicked"),
                Err(_) => warn!("worker did not stop in time"),
            }
        }
        info!(height = self.chain.height(), "node closed");
    }
}
