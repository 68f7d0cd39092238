//! Producer eligibility.
//!
//! How a producer earns the right to stamp a block is pluggable. The chain
//! core only needs four answers: the expected generation signature, whether
//! a block's generation signature is right, the producer's earliest slot,
//! and the next base target.

use strata_crypto::blake2b_256_multi;
use strata_types::{PublicKey, Timestamp, ONE_COIN};

use crate::block::Block;

pub trait HitVerifier: Send + Sync {
    /// Generation signature a block on top of `previous` by `generator`
    /// must carry.
    fn generation_signature(&self, previous: &Block, generator: &PublicKey) -> [u8; 32] {
        blake2b_256_multi(&[&previous.generation_signature, generator.as_bytes()])
    }

    fn verify_generation_signature(&self, block: &Block, previous: &Block) -> bool {
        block.generation_signature
            == self.generation_signature(previous, &block.generator_public_key)
    }

    /// First timestamp at which `generator`, holding `balance`, may produce
    /// on top of `previous`. `None` if it may not produce at all.
    fn earliest_timestamp(
        &self,
        previous: &Block,
        generator: &PublicKey,
        balance: u64,
    ) -> Option<Timestamp>;

    fn next_base_target(&self, previous: &Block, _timestamp: Timestamp) -> u64 {
        previous.base_target
    }
}

/// Stake-weighted hits: a producer's hit is the leading eight bytes of its
/// generation signature and its slot arrives once
/// `elapsed * base_target * balance_in_coins` exceeds the hit.
#[derive(Clone, Copy, Debug, Default)]
pub struct StakeHitVerifier;

impl HitVerifier for StakeHitVerifier {
    fn earliest_timestamp(
        &self,
        previous: &Block,
        generator: &PublicKey,
        balance: u64,
    ) -> Option<Timestamp> {
        let coins = balance / ONE_COIN;
        if coins == 0 {
            return None;
        }
        let signature = self.generation_signature(previous, generator);
        let mut head = [0u8; 8];
        head.copy_from_slice(&signature[..8]);
        let hit = u128::from(u64::from_le_bytes(head));
        let rate = u128::from(previous.base_target.max(1)) * u128::from(coins);
        let elapsed = u64::try_from(hit / rate + 1).ok()?;
        Some(previous.timestamp.plus_secs(elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::Genesis;
    use strata_crypto::keypair_from_seed;
    use strata_types::AccountId;

    #[test]
    fn larger_stake_is_never_later() {
        let genesis = Genesis::single(AccountId::new(1), 1).block();
        let kp = keypair_from_seed(&[6u8; 32]);
        let small = StakeHitVerifier
            .earliest_timestamp(&genesis, &kp.public, 10 * ONE_COIN)
            .unwrap();
        let large = StakeHitVerifier
            .earliest_timestamp(&genesis, &kp.public, 10_000 * ONE_COIN)
            .unwrap();
        assert!(large <= small);
        assert!(large > genesis.timestamp);
    }

    #[test]
    fn dust_balance_is_not_eligible() {
        let genesis = Genesis::single(AccountId::new(1), 1).block();
        let kp = keypair_from_seed(&[6u8; 32]);
        assert!(StakeHitVerifier
            .earliest_timestamp(&genesis, &kp.public, ONE_COIN - 1)
            .is_none());
    }

    #[test]
    fn generation_signature_depends_on_producer() {
        let genesis = Genesis::single(AccountId::new(1), 1).block();
        let a = keypair_from_seed(&[1u8; 32]);
        let b = keypair_from_seed(&[2u8; 32]);
        assert_ne!(
            StakeHitVerifier.generation_signature(&genesis, &a.public),
            StakeHitVerifier.generation_signature(&genesis, &b.public)
        );
    }
}
