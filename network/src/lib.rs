//! The peer side of the Strata chain core.
//!
//! Discovery, handshakes and the byte transport live outside this crate. It
//! defines what the sync engine needs from a peer:
//! - [`Peer`], an async request/response contract over JSON objects
//! - [`wire`], the request and response shapes
//! - [`PeerSet`], reliability-weighted selection and blacklisting

pub mod error;
pub mod peer;
pub mod peer_set;
pub mod wire;

pub use error::NetworkError;
pub use peer::{decode_response, Peer};
pub use peer_set::{PenaltyReason, PeerSet};
pub use wire::{CumulativeDifficulty, MilestoneBlockIds, PeerRequest};
