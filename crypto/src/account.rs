use strata_types::{AccountId, PublicKey};

use crate::hash::blake2b_256;

/// The account id owned by `public_key`: the little-endian leading eight
/// bytes of its Blake2b-256 digest.
pub fn account_id(public_key: &PublicKey) -> AccountId {
    let digest = blake2b_256(public_key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    AccountId::new(u64::from_le_bytes(head))
}
