//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use strata_crypto::{account_id, keypair_from_seed};
use strata_ledger::Genesis;
use strata_types::{NetworkId, ProtocolParams, ONE_COIN};

use crate::NodeError;

/// Configuration for a Strata node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which network to follow.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// Data directory for chain storage.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Protocol parameters, derived from `network` rather than read from TOML.
    #[serde(skip)]
    pub params: ProtocolParams,

    /// Allocations of the genesis block.
    #[serde(default = "default_genesis")]
    pub genesis: Genesis,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum number of peer connections.
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,

    /// Capacity of the admitted table; the waiting queue uses the same bound.
    #[serde(default = "default_max_unconfirmed")]
    pub max_unconfirmed_transactions: usize,

    /// How long a transaction may sit in the waiting queue.
    #[serde(default = "default_max_waiting_secs")]
    pub max_waiting_secs: u64,

    /// Whether derived state history is trimmed below the rollback window.
    #[serde(default = "default_true")]
    pub enable_trimming: bool,

    /// Blocks between trims.
    #[serde(default = "default_trim_frequency")]
    pub trim_frequency: u32,

    /// Bound on the number of blocks kept in the block cache.
    #[serde(default = "default_block_cache_size")]
    pub block_cache_size: usize,

    // ── Worker intervals ─────────────────────────────────────────────────
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    #[serde(default = "default_trim_interval_secs")]
    pub trim_interval_secs: u64,

    #[serde(default = "default_expiry_sweep_interval_secs")]
    pub expiry_sweep_interval_secs: u64,

    #[serde(default = "default_rebroadcast_interval_secs")]
    pub rebroadcast_interval_secs: u64,

    #[serde(default = "default_peer_pull_interval_secs")]
    pub peer_pull_interval_secs: u64,

    #[serde(default = "default_waiting_drain_interval_ms")]
    pub waiting_drain_interval_ms: u64,

    /// Whether to keep Prometheus metrics.
    #[serde(default)]
    pub enable_metrics: bool,

    #[serde(default)]
    pub sync: SyncConfig,
}

/// Tuning for the sync engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Peers that must be connected before a sync iteration runs.
    #[serde(default = "default_min_connected_peers")]
    pub min_connected_peers: usize,

    /// Additional peers that must agree before a deep reorg is applied.
    #[serde(default = "default_fork_confirmations")]
    pub fork_confirmations: usize,

    /// Reorgs at most this deep skip the confirmation round.
    #[serde(default = "default_confirmation_window")]
    pub confirmation_window: u32,

    /// Largest block-id list accepted from, or served to, a peer.
    #[serde(default = "default_max_block_ids")]
    pub max_block_ids: u32,

    /// Blocks per download request.
    #[serde(default = "default_segment_size")]
    pub segment_size: u32,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Milestone requests before the common-ancestor search gives up.
    #[serde(default = "default_max_milestone_rounds")]
    pub max_milestone_rounds: u32,

    #[serde(default = "default_blacklist_secs")]
    pub blacklist_secs: u64,
}

// ── Defaults ───────────────────────────────────────────────────────────

fn default_network() -> NetworkId {
    NetworkId::Live
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// Seed of the development genesis account.
pub const DEV_GENESIS_SEED: [u8; 32] = *b"strata-development-genesis-acct!";

fn default_genesis() -> Genesis {
    let account = account_id(&keypair_from_seed(&DEV_GENESIS_SEED).public);
    Genesis::single(account, 1_000_000_000 * ONE_COIN)
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_peers() -> usize {
    20
}

fn default_max_unconfirmed() -> usize {
    2000
}

fn default_max_waiting_secs() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

fn default_trim_frequency() -> u32 {
    1000
}

fn default_block_cache_size() -> usize {
    720
}

fn default_sync_interval_ms() -> u64 {
    1000
}

fn default_trim_interval_secs() -> u64 {
    60
}

fn default_expiry_sweep_interval_secs() -> u64 {
    1
}

fn default_rebroadcast_interval_secs() -> u64 {
    60
}

fn default_peer_pull_interval_secs() -> u64 {
    5
}

fn default_waiting_drain_interval_ms() -> u64 {
    500
}

fn default_min_connected_peers() -> usize {
    1
}

fn default_fork_confirmations() -> usize {
    2
}

fn default_confirmation_window() -> u32 {
    10
}

fn default_max_block_ids() -> u32 {
    1440
}

fn default_segment_size() -> u32 {
    36
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_milestone_rounds() -> u32 {
    20
}

fn default_blacklist_secs() -> u64 {
    600
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string. Protocol parameters follow
    /// the configured network.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let mut config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.params = ProtocolParams::for_network(config.network);
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Switch network, keeping protocol parameters in step.
    pub fn with_network(mut self, network: NetworkId) -> Self {
        self.network = network;
        self.params = ProtocolParams::for_network(network);
        self
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            data_dir: default_data_dir(),
            params: ProtocolParams::default(),
            genesis: default_genesis(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            max_peers: default_max_peers(),
            max_unconfirmed_transactions: default_max_unconfirmed(),
            max_waiting_secs: default_max_waiting_secs(),
            enable_trimming: true,
            trim_frequency: default_trim_frequency(),
            block_cache_size: default_block_cache_size(),
            sync_interval_ms: default_sync_interval_ms(),
            trim_interval_secs: default_trim_interval_secs(),
            expiry_sweep_interval_secs: default_expiry_sweep_interval_secs(),
            rebroadcast_interval_secs: default_rebroadcast_interval_secs(),
            peer_pull_interval_secs: default_peer_pull_interval_secs(),
            waiting_drain_interval_ms: default_waiting_drain_interval_ms(),
            enable_metrics: false,
            sync: SyncConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_connected_peers: default_min_connected_peers(),
            fork_confirmations: default_fork_confirmations(),
            confirmation_window: default_confirmation_window(),
            max_block_ids: default_max_block_ids(),
            segment_size: default_segment_size(),
            request_timeout_ms: default_request_timeout_ms(),
            max_milestone_rounds: default_max_milestone_rounds(),
            blacklist_secs: default_blacklist_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.max_peers, config.max_peers);
        assert_eq!(parsed.genesis, config.genesis);
        assert_eq!(parsed.sync, config.sync);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.network, NetworkId::Live);
        assert_eq!(config.max_unconfirmed_transactions, 2000);
        assert!(config.enable_trimming);
        assert_eq!(config.sync.max_block_ids, 1440);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            network = "dev"
            max_waiting_secs = 60

            [sync]
            segment_size = 10
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.network, NetworkId::Dev);
        assert_eq!(config.params, ProtocolParams::for_network(NetworkId::Dev));
        assert_eq!(config.max_waiting_secs, 60);
        assert_eq!(config.sync.segment_size, 10);
        assert_eq!(config.sync.fork_confirmations, 2);
    }

    #[test]
    fn missing_file_returns_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = NodeConfig::from_toml_file(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(NodeError::Config(_))));
    }

    #[test]
    fn file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "log_level = \"debug\"\n").unwrap();
        let config = NodeConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.log_level, "debug");
    }
}
