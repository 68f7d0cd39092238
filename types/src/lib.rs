//! Fundamental types for the Strata chain core.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! block/transaction/account identifiers, digests, timestamps, keys, the
//! protocol constants, and the clock abstraction.

pub mod decimal;
pub mod hash;
pub mod ids;
pub mod keys;
pub mod network;
pub mod params;
pub mod time;

pub use hash::{BlockHash, TxHash};
pub use ids::{AccountId, BlockId, TransactionId};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use network::NetworkId;
pub use params::{ProtocolParams, ONE_COIN};
pub use time::{Clock, SystemClock, Timestamp};
