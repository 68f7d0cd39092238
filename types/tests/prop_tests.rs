use proptest::prelude::*;

use strata_types::{AccountId, BlockHash, BlockId, Timestamp, TxHash};

proptest! {
    /// The short id is the little-endian prefix of the digest.
    #[test]
    fn block_id_is_hash_prefix(bytes in prop::array::uniform32(0u8..)) {
        let hash = BlockHash::new(bytes);
        let mut head = [0u8; 8];
        head.copy_from_slice(&bytes[..8]);
        prop_assert_eq!(hash.id(), BlockId::new(u64::from_le_bytes(head)));
    }

    #[test]
    fn tx_hash_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        let hash = TxHash::new(bytes);
        prop_assert_eq!(hash.is_zero(), bytes == [0u8; 32]);
    }

    /// Ids survive the decimal-string wire form for the whole u64 range.
    #[test]
    fn account_id_json_round_trip(raw in any::<u64>()) {
        let id = AccountId::new(raw);
        let json = serde_json::to_string(&id).unwrap();
        let back: AccountId = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, id);
    }

    #[test]
    fn timestamp_ordering(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        let ta = Timestamp::new(a);
        let tb = Timestamp::new(b);
        prop_assert_eq!(ta <= tb, a <= b);
        prop_assert_eq!(ta.elapsed_since(tb), b.saturating_sub(a));
    }
}
