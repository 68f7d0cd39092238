//! Abstract chain storage for the Strata chain core.
//!
//! Every storage backend (LMDB, in-memory for testing) implements
//! [`ChainStore`]. The rest of the codebase depends only on the trait.
//!
//! Blocks are append-only rows keyed by id and indexed by height; the head
//! is always the highest stored block. Mutations are grouped in a
//! [`WriteBatch`] that a backend applies atomically or not at all.

pub mod batch;
pub mod chain;
pub mod error;
pub mod scan;

pub use batch::{WriteBatch, WriteOp};
pub use chain::ChainStore;
pub use error::StoreError;
pub use scan::ScanRecord;
