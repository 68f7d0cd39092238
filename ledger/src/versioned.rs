//! Height-versioned key/value table.
//!
//! Every write is tagged with the height it was made at. Rolling back to `h`
//! discards all versions above `h`; trimming at `h` collapses the history at
//! or below `h` into a single version per key.

use std::collections::HashMap;
use std::hash::Hash;

use crate::derived::{DerivedState, RollbackError};

#[derive(Clone, Debug, PartialEq, Eq)]
struct Version<V> {
    height: u32,
    value: Option<V>,
}

#[derive(Clone, Debug)]
pub struct VersionedTable<K, V> {
    name: &'static str,
    rows: HashMap<K, Vec<Version<V>>>,
    trimmed_height: u32,
}

impl<K, V> VersionedTable<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rows: HashMap::new(),
            trimmed_height: 0,
        }
    }

    pub fn trimmed_height(&self) -> u32 {
        self.trimmed_height
    }

    /// Latest value of `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.rows
            .get(key)
            .and_then(|versions| versions.last())
            .and_then(|v| v.value.as_ref())
    }

    /// Value of `key` as of `height`. Below the trimmed height only the
    /// collapsed version survives.
    pub fn get_at(&self, key: &K, height: u32) -> Option<&V> {
        self.rows
            .get(key)?
            .iter()
            .rev()
            .find(|v| v.height <= height)
            .and_then(|v| v.value.as_ref())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: K, value: V, height: u32) {
        self.write(key, Some(value), height);
    }

    pub fn remove(&mut self, key: K, height: u32) {
        if self.contains(&key) {
            self.write(key, None, height);
        }
    }

    fn write(&mut self, key: K, value: Option<V>, height: u32) {
        let versions = self.rows.entry(key).or_default();
        match versions.last_mut() {
            Some(last) if last.height == height => last.value = value,
            _ => versions.push(Version { height, value }),
        }
    }

    /// Iterate over the latest live value of every key.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.rows.iter().filter_map(|(k, versions)| {
            versions
                .last()
                .and_then(|v| v.value.as_ref())
                .map(|value| (k, value))
        })
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored versions across all keys.
    pub fn version_count(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }
}

impl<K, V> DerivedState for VersionedTable<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn trim(&mut self, height: u32) {
        self.rows.retain(|_, versions| {
            let keep_from = versions
                .iter()
                .rposition(|v| v.height <= height)
                .unwrap_or(0);
            versions.drain(..keep_from);
            !(versions.len() == 1 && versions[0].value.is_none() && versions[0].height <= height)
        });
        self.trimmed_height = self.trimmed_height.max(height);
    }

    fn rollback(&mut self, height: u32) -> Result<(), RollbackError> {
        if height < self.trimmed_height {
            return Err(RollbackError {
                table: self.name,
                requested: height,
                trimmed: self.trimmed_height,
            });
        }
        self.rows.retain(|_, versions| {
            versions.retain(|v| v.height <= height);
            !versions.is_empty()
        });
        Ok(())
    }

    fn truncate(&mut self) {
        self.rows.clear();
        self.trimmed_height = 0;
    }
}
