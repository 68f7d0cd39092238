//! Startup integrity checks for the LMDB chain store.

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::Env;

use crate::environment::DATABASE_NAMES;
use crate::LmdbError;

/// Result of [`check_integrity`].
#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub databases_checked: u32,
    pub total_entries: u64,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Count every database and cross-check the block and height indexes.
///
/// Read failures are collected in the report; only a failure to open a read
/// transaction is returned as an error.
pub fn check_integrity(env: &Arc<Env>) -> Result<IntegrityReport, LmdbError> {
    let mut report = IntegrityReport::default();
    let rtxn = env.read_txn()?;

    let mut counts = Vec::with_capacity(DATABASE_NAMES.len());
    for &name in DATABASE_NAMES {
        match env.open_database::<Bytes, Bytes>(&rtxn, Some(name)) {
            Ok(Some(db)) => {
                report.databases_checked += 1;
                match db.len(&rtxn) {
                    Ok(count) => {
                        report.total_entries += count;
                        counts.push((name, count));
                    }
                    Err(e) => report.errors.push(format!("failed to read '{name}': {e}")),
                }
            }
            // Not created yet: a fresh data directory.
            Ok(None) => {}
            Err(e) => report.errors.push(format!("failed to open '{name}': {e}")),
        }
    }

    let count_of = |name: &str| counts.iter().find(|(n, _)| *n == name).map(|(_, c)| *c);
    if let (Some(blocks), Some(heights)) = (count_of("blocks"), count_of("heights")) {
        if blocks != heights {
            report.errors.push(format!(
                "{blocks} blocks stored but {heights} heights indexed"
            ));
        }
    }
    if let (Some(txs), Some(hashes)) = (count_of("tx_index"), count_of("tx_hashes")) {
        if txs != hashes {
            report.errors.push(format!(
                "{txs} transaction ids indexed but {hashes} full hashes"
            ));
        }
    }

    Ok(report)
}

/// Reject a data directory that exists without an LMDB data file.
pub fn check_data_dir(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Ok(());
    }
    let data_file = path.join("data.mdb");
    if !data_file.exists() {
        return Err(format!(
            "LMDB directory exists but data.mdb is missing at {}",
            path.display()
        ));
    }
    Ok(())
}
