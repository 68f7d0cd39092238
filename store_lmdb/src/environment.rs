//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::LmdbError;

/// Default map size: 16 GiB of address space, grown lazily by LMDB.
pub const DEFAULT_MAP_SIZE: usize = 16 * 1024 * 1024 * 1024;

pub(crate) const DATABASE_NAMES: &[&str] = &["blocks", "heights", "tx_index", "tx_hashes", "meta"];

/// The LMDB environment and every database handle the chain store uses.
///
/// - `blocks`: block id (LE) → bincode `Block`
/// - `heights`: height (BE) → block id (LE)
/// - `tx_index`: transaction id (LE) → height (BE) ‖ block id (LE)
/// - `tx_hashes`: transaction full hash → height (BE)
/// - `meta`: string key → bincode value
#[derive(Clone)]
pub struct LmdbEnvironment {
    pub(crate) env: Arc<Env>,
    pub(crate) blocks_db: Database<Bytes, Bytes>,
    pub(crate) heights_db: Database<Bytes, Bytes>,
    pub(crate) tx_index_db: Database<Bytes, Bytes>,
    pub(crate) tx_hashes_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment in the directory `path`.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)
            .map_err(|e| LmdbError::Heed(format!("create {}: {e}", path.display())))?;
        // SAFETY: the environment is opened once per directory by this process
        // and never mapped concurrently by another `Env` in the same process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(DATABASE_NAMES.len() as u32)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let blocks_db = env.create_database(&mut wtxn, Some("blocks"))?;
        let heights_db = env.create_database(&mut wtxn, Some("heights"))?;
        let tx_index_db = env.create_database(&mut wtxn, Some("tx_index"))?;
        let tx_hashes_db = env.create_database(&mut wtxn, Some("tx_hashes"))?;
        let meta_db = env.create_database(&mut wtxn, Some("meta"))?;
        wtxn.commit()?;

        tracing::debug!(path = %path.display(), "opened LMDB environment");
        Ok(Self {
            env: Arc::new(env),
            blocks_db,
            heights_db,
            tx_index_db,
            tx_hashes_db,
            meta_db,
        })
    }

    pub fn env(&self) -> &Arc<Env> {
        &self.env
    }
}
