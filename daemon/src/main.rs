//! Strata daemon: entry point for running a chain node.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;

use strata_network::PeerSet;
use strata_node::{init_logging, ChainNode, LogFormat, NodeConfig};
use strata_store::ChainStore;
use strata_store_lmdb::{check_data_dir, LmdbChainStore, LmdbEnvironment};
use strata_types::NetworkId;

/// LMDB map size; the file grows lazily up to this bound.
const LMDB_MAP_SIZE: usize = 64 << 30;

#[derive(Parser)]
#[command(name = "strata-node", about = "Strata chain node")]
struct Cli {
    /// Network to follow: "live", "test", or "dev".
    /// When a config file is provided, defaults to the file's network value.
    #[arg(long, env = "STRATA_NETWORK")]
    network: Option<NetworkId>,

    /// Data directory for chain storage.
    #[arg(long, env = "STRATA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log format: "human" or "json".
    #[arg(long, env = "STRATA_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log level, e.g. "info" or "debug,strata_node=trace".
    #[arg(long, env = "STRATA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Maximum number of peer connections.
    #[arg(long, env = "STRATA_MAX_PEERS")]
    max_peers: Option<usize>,

    /// Collect Prometheus metrics.
    #[arg(long, env = "STRATA_ENABLE_METRICS")]
    metrics: bool,

    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_toml_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => NodeConfig::default(),
        };
        if let Some(network) = self.network {
            config = config.with_network(network);
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(format) = self.log_format {
            config.log_format = match format {
                LogFormat::Human => "human".to_string(),
                LogFormat::Json => "json".to_string(),
            };
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(max_peers) = self.max_peers {
            config.max_peers = max_peers;
        }
        config.enable_metrics |= self.metrics;
        Ok(config)
    }
}

fn open_store(config: &NodeConfig) -> anyhow::Result<Arc<dyn ChainStore>> {
    let dir = config.data_dir.join(config.network.as_str());
    check_data_dir(&dir).map_err(|e| anyhow!(e))?;
    let env = LmdbEnvironment::open(&dir, LMDB_MAP_SIZE)
        .with_context(|| format!("opening chain store at {}", dir.display()))?;
    tracing::info!(path = %dir.display(), "chain store opened");
    Ok(Arc::new(LmdbChainStore::new(env)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;

    let format: LogFormat = config
        .log_format
        .parse()
        .map_err(|e: String| anyhow!(e))
        .context("invalid log format")?;
    init_logging(format, &config.log_level).context("installing log subscriber")?;

    tracing::info!(
        network = config.network.as_str(),
        data_dir = %config.data_dir.display(),
        "starting strata node"
    );

    let store = open_store(&config)?;
    // Peers are attached by the transport layer; the node starts with none.
    let peers = PeerSet::new(config.max_peers, config.sync.blacklist_secs);
    let mut node = ChainNode::new(config, store, peers).context("opening chain")?;
    node.start();

    let shutdown = Arc::clone(&node.shutdown);
    shutdown
        .wait_for_signal()
        .await
        .context("waiting for shutdown signal")?;

    node.close().await;
    tracing::info!("strata daemon exited cleanly");
    Ok(())
}
