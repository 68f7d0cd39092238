//! The signed transaction value.

use serde::{Deserialize, Serialize};
use strata_crypto::{account_id, blake2b_256, blake2b_256_multi, verify_signature};
use strata_types::{AccountId, BlockId, PublicKey, Signature, Timestamp, TransactionId, TxHash};

use crate::attachment::{Attachment, TransactionType};
use crate::phasing::Phasing;

/// A signed transaction.
///
/// Every derived value (full hash, id, sender, size) is a pure function of
/// these fields, so two nodes holding the same fields agree on all of them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub version: u8,
    pub timestamp: Timestamp,
    /// Minutes after `timestamp` until the transaction expires.
    pub deadline: u16,
    pub sender_public_key: PublicKey,
    pub recipient: Option<AccountId>,
    pub amount: u64,
    pub fee: u64,
    /// A transaction that must already be confirmed before this one.
    pub referenced_transaction_full_hash: Option<TxHash>,
    pub ec_block_height: u32,
    pub ec_block_id: BlockId,
    pub attachment: Attachment,
    pub phasing: Option<Phasing>,
    pub signature: Signature,
}

impl Transaction {
    pub fn transaction_type(&self) -> TransactionType {
        self.attachment.transaction_type()
    }

    pub fn sender(&self) -> AccountId {
        account_id(&self.sender_public_key)
    }

    pub fn expiration(&self) -> Timestamp {
        self.timestamp.plus_secs(u64::from(self.deadline) * 60)
    }

    /// Bytes covered by the signature.
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        let ty = self.transaction_type();
        let mut out = Vec::with_capacity(160);
        out.push(ty.kind);
        out.push(ty.subtype);
        out.push(self.version);
        out.extend_from_slice(&self.timestamp.as_secs().to_le_bytes());
        out.extend_from_slice(&self.deadline.to_le_bytes());
        out.extend_from_slice(self.sender_public_key.as_bytes());
        out.extend_from_slice(&self.recipient.map_or(0, |r| r.get()).to_le_bytes());
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.extend_from_slice(&self.fee.to_le_bytes());
        match &self.referenced_transaction_full_hash {
            Some(hash) => out.extend_from_slice(hash.as_bytes()),
            None => out.extend_from_slice(&[0u8; 32]),
        }
        out.extend_from_slice(&self.ec_block_height.to_le_bytes());
        out.extend_from_slice(&self.ec_block_id.to_le_bytes());
        self.attachment.write_bytes(&mut out);
        match &self.phasing {
            Some(phasing) => {
                out.push(1);
                phasing.write_bytes(&mut out);
            }
            None => out.push(0),
        }
        out
    }

    /// Canonical encoding: unsigned bytes followed by the signature.
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = self.unsigned_bytes();
        out.extend_from_slice(self.signature.as_bytes());
        out
    }

    pub fn size(&self) -> usize {
        self.bytes().len()
    }

    /// Digest of the unsigned bytes and the signature digest.
    pub fn full_hash(&self) -> TxHash {
        let signature_hash = blake2b_256(self.signature.as_bytes());
        TxHash::new(blake2b_256_multi(&[&self.unsigned_bytes(), &signature_hash]))
    }

    pub fn id(&self) -> TransactionId {
        self.full_hash().id()
    }

    pub fn fee_per_byte(&self) -> u64 {
        self.fee / self.size().max(1) as u64
    }

    pub fn verify_signature(&self) -> bool {
        verify_signature(
            &self.unsigned_bytes(),
            &self.signature,
            &self.sender_public_key,
        )
    }
}
