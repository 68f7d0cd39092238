//! Nullable infrastructure for deterministic testing.
//!
//! Every external dependency of the chain core (time, storage, producer
//! eligibility) sits behind a trait. The implementations here:
//! - return deterministic values
//! - can be steered programmatically from a test
//! - never touch the filesystem or network
//!
//! Swap them in for the real implementations in tests.

pub mod clock;
pub mod hit;
pub mod store;

pub use clock::NullClock;
pub use hit::NullHitVerifier;
pub use store::NullStore;
