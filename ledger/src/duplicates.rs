//! Scratch map that forbids conflicting transactions inside one block or
//! inside the unconfirmed pool.

use std::collections::HashMap;
use strata_transactions::TransactionType;

/// A `(transaction type, semantic key)` pair plus the number of transactions
/// allowed to share it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DuplicateKey {
    pub transaction_type: TransactionType,
    pub key: String,
    pub max_count: u32,
}

impl DuplicateKey {
    pub fn unique(transaction_type: TransactionType, key: impl Into<String>) -> Self {
        Self {
            transaction_type,
            key: key.into(),
            max_count: 1,
        }
    }
}

impl std::fmt::Display for DuplicateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.transaction_type, self.key)
    }
}

#[derive(Clone, Debug, Default)]
pub struct DuplicateKeys {
    counts: HashMap<(TransactionType, String), u32>,
}

impl DuplicateKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one use of `key`. Returns `false`, leaving the map unchanged,
    /// when the key is already used `max_count` times.
    pub fn try_register(&mut self, key: &DuplicateKey) -> bool {
        let count = self
            .counts
            .entry((key.transaction_type, key.key.clone()))
            .or_insert(0);
        if *count >= key.max_count {
            return false;
        }
        *count += 1;
        true
    }

    /// Undo one [`try_register`](Self::try_register).
    pub fn release(&mut self, key: &DuplicateKey) {
        let map_key = (key.transaction_type, key.key.clone());
        if let Some(count) = self.counts.get_mut(&map_key) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(&map_key);
            }
        }
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_use_of_unique_key_is_refused() {
        let mut keys = DuplicateKeys::new();
        let key = DuplicateKey::unique(TransactionType::ALIAS_ASSIGNMENT, "satoshi");
        assert!(keys.try_register(&key));
        assert!(!keys.try_register(&key));
        keys.release(&key);
        assert!(keys.try_register(&key));
    }

    #[test]
    fn same_key_under_different_types_does_not_collide() {
        let mut keys = DuplicateKeys::new();
        assert!(keys.try_register(&DuplicateKey::unique(TransactionType::ALIAS_ASSIGNMENT, "x")));
        assert!(keys.try_register(&DuplicateKey::unique(TransactionType::ACCOUNT_INFO, "x")));
    }

    #[test]
    fn release_of_last_use_empties_map() {
        let mut keys = DuplicateKeys::new();
        let key = DuplicateKey {
            transaction_type: TransactionType::ARBITRARY_MESSAGE,
            key: "k".into(),
            max_count: 2,
        };
        assert!(keys.try_register(&key));
        assert!(keys.try_register(&key));
        assert!(!keys.try_register(&key));
        keys.release(&key);
        keys.release(&key);
        assert!(keys.is_empty());
    }
}
