//! The Strata transaction model.
//!
//! A [`Transaction`] carries a closed [`Attachment`] sum type whose variant
//! selects the transaction kind. Kind-specific state rules live in
//! `strata-ledger`; this crate owns the data, its byte encoding, signing, and
//! the checks that need no chain state.

pub mod attachment;
pub mod builder;
pub mod error;
pub mod phasing;
pub mod transaction;
pub mod validation;

pub use attachment::{Attachment, TransactionType};
pub use builder::TransactionBuilder;
pub use error::TransactionError;
pub use phasing::Phasing;
pub use transaction::Transaction;
pub use validation::{check_timing, validate_transaction};
