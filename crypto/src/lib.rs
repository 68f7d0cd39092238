//! Cryptographic primitives for the Strata chain core.
//!
//! - **Ed25519** for block and transaction signatures
//! - **Blake2b-256** for block hashes, transaction full hashes and payload hashes
//! - Account ids derived from public keys

pub mod account;
pub mod hash;
pub mod keys;
pub mod sign;

pub use account::account_id;
pub use hash::{blake2b_256, blake2b_256_multi, PayloadHasher};
pub use keys::{generate_keypair, keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
