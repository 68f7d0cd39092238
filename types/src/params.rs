//! Protocol constants shared by every node on a network.
//!
//! Amounts are expressed in base units; one coin is [`ONE_COIN`] base units.

use crate::network::NetworkId;
use serde::{Deserialize, Serialize};

/// Base units per coin.
pub const ONE_COIN: u64 = 100_000_000;

/// Chain-wide constants. Two nodes with different values will fork.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    // ── Blocks ───────────────────────────────────────────────────────────
    /// Maximum number of transactions in one block.
    pub max_transactions_per_block: u32,

    /// Maximum summed byte length of a block's transactions.
    pub max_payload_length: u32,

    /// Height at which blocks switch from version 1 to version 2.
    pub block_v2_height: u32,

    /// Base target of the genesis block.
    pub genesis_base_target: u64,

    // ── Timing ───────────────────────────────────────────────────────────
    /// How far ahead of the local clock a block or transaction may be stamped.
    pub max_timedrift_secs: u64,

    /// Upper bound on a transaction's deadline.
    pub max_deadline_minutes: u16,

    /// Blocks stamped within this window of now are relayed after acceptance.
    pub relay_window_secs: u64,

    // ── Rollback ─────────────────────────────────────────────────────────
    /// Depth of history kept in derived state; pop-off deeper than this
    /// falls back to a rescan.
    pub max_rollback: u32,

    /// How far below the head a transaction's EC block may lie.
    pub ec_block_distance_limit: u32,

    // ── Fees and amounts ─────────────────────────────────────────────────
    pub min_fee: u64,
    pub max_balance: u64,

    // ── Attachments ──────────────────────────────────────────────────────
    pub max_message_length: u32,
    pub max_alias_length: u32,
    pub max_alias_uri_length: u32,
    pub max_account_name_length: u32,
    pub max_account_description_length: u32,

    /// Longest allowed phasing window, in blocks.
    pub max_phasing_duration: u32,
}

impl ProtocolParams {
    /// Parameters of the production network.
    pub fn live() -> Self {
        Self {
            max_transactions_per_block: 255,
            max_payload_length: 255 * 176,
            block_v2_height: 0,
            genesis_base_target: 153_722_867,

            max_timedrift_secs: 15,
            max_deadline_minutes: 1440,
            relay_window_secs: 600,

            max_rollback: 800,
            ec_block_distance_limit: 60,

            min_fee: ONE_COIN,
            max_balance: 1_000_000_000 * ONE_COIN,

            max_message_length: 1000,
            max_alias_length: 100,
            max_alias_uri_length: 1000,
            max_account_name_length: 100,
            max_account_description_length: 1000,

            max_phasing_duration: 14 * 1440,
        }
    }

    pub fn for_network(network: NetworkId) -> Self {
        match network {
            NetworkId::Live => Self::live(),
            NetworkId::Test => Self {
                max_rollback: 400,
                ..Self::live()
            },
            NetworkId::Dev => Self {
                max_rollback: 10,
                min_fee: 1,
                max_phasing_duration: 100,
                ..Self::live()
            },
        }
    }

    /// Block version required at `height`.
    pub fn block_version_at(&self, height: u32) -> u8 {
        if height < self.block_v2_height {
            1
        } else {
            2
        }
    }
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self::live()
    }
}
