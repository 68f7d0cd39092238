//! Chain-derived state for the Strata chain core.
//!
//! - [`Block`] and the deterministic [`Genesis`] block
//! - [`VersionedTable`], a height-tagged map that can roll back and trim
//! - [`DerivedState`], the contract every height-tracking view implements
//! - [`Ledger`]: accounts, aliases, account info and phasing polls
//! - [`TransactionKind`] implementations dispatched by [`TransactionTypeRegistry`]
//! - [`HitVerifier`], the producer-eligibility seam

pub mod account;
pub mod block;
pub mod derived;
pub mod duplicates;
pub mod error;
pub mod generation;
pub mod genesis;
pub mod kind;
pub mod kinds;
pub mod ledger;
pub mod phasing;
pub mod registry;
pub mod versioned;

pub use account::{AccountInfo, AccountRecord, Alias};
pub use block::Block;
pub use derived::{DerivedState, RollbackError};
pub use duplicates::{DuplicateKey, DuplicateKeys};
pub use error::LedgerError;
pub use generation::{HitVerifier, StakeHitVerifier};
pub use genesis::Genesis;
pub use kind::TransactionKind;
pub use ledger::Ledger;
pub use phasing::PhasingPoll;
pub use registry::TransactionTypeRegistry;
pub use versioned::VersionedTable;
