use strata_crypto::sign_message;
use strata_types::{AccountId, BlockId, KeyPair, Signature, Timestamp, TxHash};

use crate::attachment::Attachment;
use crate::phasing::Phasing;
use crate::transaction::Transaction;

/// Assembles and signs a [`Transaction`].
pub struct TransactionBuilder {
    attachment: Attachment,
    timestamp: Timestamp,
    deadline: u16,
    recipient: Option<AccountId>,
    amount: u64,
    fee: u64,
    referenced: Option<TxHash>,
    ec_block: (u32, BlockId),
    phasing: Option<Phasing>,
}

impl TransactionBuilder {
    pub fn new(attachment: Attachment, timestamp: Timestamp) -> Self {
        Self {
            attachment,
            timestamp,
            deadline: 60,
            recipient: None,
            amount: 0,
            fee: 0,
            referenced: None,
            ec_block: (0, BlockId::ZERO),
            phasing: None,
        }
    }

    pub fn deadline(mut self, minutes: u16) -> Self {
        self.deadline = minutes;
        self
    }

    pub fn recipient(mut self, recipient: AccountId) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }

    pub fn fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    pub fn referenced(mut self, full_hash: TxHash) -> Self {
        self.referenced = Some(full_hash);
        self
    }

    pub fn ec_block(mut self, height: u32, id: BlockId) -> Self {
        self.ec_block = (height, id);
        self
    }

    pub fn phasing(mut self, phasing: Phasing) -> Self {
        self.phasing = Some(phasing);
        self
    }

    pub fn sign(self, keypair: &KeyPair) -> Transaction {
        let mut tx = Transaction {
            version: 1,
            timestamp: self.timestamp,
            deadline: self.deadline,
            sender_public_key: keypair.public,
            recipient: self.recipient,
            amount: self.amount,
            fee: self.fee,
            referenced_transaction_full_hash: self.referenced,
            ec_block_height: self.ec_block.0,
            ec_block_id: self.ec_block.1,
            attachment: self.attachment,
            phasing: self.phasing,
            signature: Signature::EMPTY,
        };
        tx.signature = sign_message(&tx.unsigned_bytes(), &keypair.private);
        tx
    }
}
