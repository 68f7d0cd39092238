//! LMDB storage backend for the Strata chain core.
//!
//! Implements [`strata_store::ChainStore`] with the `heed` LMDB bindings.
//! All databases live in one environment so a [`strata_store::WriteBatch`]
//! commits in a single LMDB write transaction.

pub mod chain_store;
pub mod environment;
pub mod error;
pub mod integrity;

pub use chain_store::LmdbChainStore;
pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use integrity::{check_data_dir, check_integrity, IntegrityReport};
