//! Ed25519 key generation.

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use strata_types::{KeyPair, PrivateKey, PublicKey};

/// Generate a new key pair from the operating system's random source.
pub fn generate_keypair() -> KeyPair {
    let signing_key = SigningKey::generate(&mut OsRng);
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

pub fn public_from_private(private: &PrivateKey) -> PublicKey {
    let signing_key = SigningKey::from_bytes(&private.0);
    PublicKey(signing_key.verifying_key().to_bytes())
}

/// Derive a key pair deterministically from a 32-byte seed.
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    let signing_key = SigningKey::from_bytes(seed);
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_differ() {
        let a = generate_keypair();
        let b = generate_keypair();
        assert_ne!(a.public, b.public);
    }

    #[test]
    fn seed_derivation_is_deterministic() {
        let a = keypair_from_seed(&[9u8; 32]);
        let b = keypair_from_seed(&[9u8; 32]);
        assert_eq!(a.public, b.public);
        assert_eq!(public_from_private(&a.private), a.public);
    }
}
