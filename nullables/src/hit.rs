//! Nullable producer eligibility.

use strata_ledger::{Block, HitVerifier};
use strata_types::{PublicKey, Timestamp};

/// Any producer may stamp a block one second after its parent, whatever
/// its balance. Generation signatures are still checked.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullHitVerifier;

impl HitVerifier for NullHitVerifier {
    fn earliest_timestamp(
        &self,
        previous: &Block,
        _generator: &PublicKey,
        _balance: u64,
    ) -> Option<Timestamp> {
        Some(previous.timestamp.plus_secs(1))
    }
}
