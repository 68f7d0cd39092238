//! Fixtures shared by the chain, sync and node tests.
//!
//! Chains run on [`NullStore`] with a [`NullClock`] and the
//! [`NullHitVerifier`], so any key pair may produce a block one second after
//! its parent.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use strata_crypto::{account_id, keypair_from_seed};
use strata_ledger::{Block, Genesis};
use strata_network::{NetworkError, Peer, PeerRequest};
use strata_node::{Chain, ChainOptions, PeerRequestHandler};
use strata_nullables::{NullClock, NullHitVerifier, NullStore};
use strata_store::ChainStore;
use strata_transactions::{Attachment, Transaction, TransactionBuilder};
use strata_types::{AccountId, KeyPair, NetworkId, ProtocolParams};

// ---------------------------------------------------------------------------
// Keys and parameters
// ---------------------------------------------------------------------------

pub const START_SECS: u64 = 1_000;
pub const FUNDS: u64 = 1_000_000;
pub const FEE: u64 = 1;

pub fn keypair(seed: u8) -> KeyPair {
    keypair_from_seed(&[seed; 32])
}

/// Holder of every genesis coin.
pub fn funded() -> KeyPair {
    keypair(7)
}

pub fn account(keypair: &KeyPair) -> AccountId {
    account_id(&keypair.public)
}

pub fn dev_params() -> ProtocolParams {
    ProtocolParams::for_network(NetworkId::Dev)
}

pub fn genesis() -> Genesis {
    Genesis::single(account(&funded()), FUNDS)
}

// ---------------------------------------------------------------------------
// Chain harness
// ---------------------------------------------------------------------------

pub struct TestChain {
    pub chain: Arc<Chain>,
    pub store: Arc<NullStore>,
    pub clock: Arc<NullClock>,
}

impl TestChain {
    pub fn new() -> Self {
        Self::with_store(Arc::new(NullStore::new()), Arc::new(NullClock::new(START_SECS)))
    }

    pub fn with_store(store: Arc<NullStore>, clock: Arc<NullClock>) -> Self {
        Self::with_options(store, clock, |options| options)
    }

    pub fn with_options(
        store: Arc<NullStore>,
        clock: Arc<NullClock>,
        customize: impl FnOnce(ChainOptions) -> ChainOptions,
    ) -> Self {
        let options = customize(options(&clock));
        let dyn_store: Arc<dyn ChainStore> = store.clone();
        let chain = Chain::open(dyn_store, options).expect("open chain");
        Self {
            chain: Arc::new(chain),
            store,
            clock,
        }
    }

    /// Open a fresh chain service on the same store and clock.
    pub fn reopen(&self) -> Self {
        Self::with_store(Arc::clone(&self.store), Arc::clone(&self.clock))
    }

    /// Timestamp for the next block; moves the clock to it.
    pub fn next_timestamp(&self) -> strata_types::Timestamp {
        let ts = self
            .chain
            .last_block()
            .timestamp
            .plus_secs(1)
            .max(self.clock_now());
        self.clock.set(ts.as_secs());
        ts
    }

    pub fn clock_now(&self) -> strata_types::Timestamp {
        self.chain.now()
    }

    /// Generate a block from the pool with `producer`.
    pub fn produce(&self, producer: &KeyPair) -> Arc<Block> {
        let ts = self.next_timestamp();
        self.chain
            .generate_block(producer, ts)
            .expect("generate block")
    }

    pub fn produce_n(&self, producer: &KeyPair, count: usize) -> Vec<Arc<Block>> {
        (0..count).map(|_| self.produce(producer)).collect()
    }

    /// A block carrying exactly `transactions`, not pushed.
    pub fn assemble(&self, producer: &KeyPair, transactions: Vec<Transaction>) -> Block {
        use strata_ledger::HitVerifier;
        let previous = self.chain.last_block();
        let ts = self.next_timestamp();
        let hit = NullHitVerifier;
        Block::assemble(
            self.chain.params().block_version_at(previous.height + 1),
            &previous,
            ts,
            transactions,
            producer,
            hit.generation_signature(&previous, &producer.public),
            hit.next_base_target(&previous, ts),
        )
        .expect("assemble block")
    }

    /// A signed transaction stamped now, naming the current EC block.
    pub fn transaction(
        &self,
        sender: &KeyPair,
        attachment: Attachment,
        build: impl FnOnce(TransactionBuilder) -> TransactionBuilder,
    ) -> Transaction {
        let (ec_height, ec_id) = self.chain.ec_block().expect("ec block");
        let builder = TransactionBuilder::new(attachment, self.clock_now())
            .fee(FEE)
            .ec_block(ec_height, ec_id);
        build(builder).sign(sender)
    }

    pub fn payment(&self, sender: &KeyPair, recipient: AccountId, amount: u64) -> Transaction {
        self.transaction(sender, Attachment::OrdinaryPayment, |b| {
            b.recipient(recipient).amount(amount)
        })
    }

    pub fn alias(&self, sender: &KeyPair, alias: &str) -> Transaction {
        self.transaction(
            sender,
            Attachment::AliasAssignment {
                alias: alias.to_string(),
                uri: "https://example.org".to_string(),
            },
            |b| b,
        )
    }
}

pub fn options(clock: &Arc<NullClock>) -> ChainOptions {
    ChainOptions::new(dev_params(), genesis())
        .with_clock(clock.clone())
        .with_hit_verifier(Arc::new(NullHitVerifier))
}

/// Copy `blocks` onto `target`, moving its clock along.
pub fn replicate(target: &TestChain, blocks: &[Arc<Block>]) {
    for block in blocks {
        if block.timestamp > target.clock_now() {
            target.clock.set(block.timestamp.as_secs());
        }
        target
            .chain
            .push_block((**block).clone())
            .expect("replicate block");
    }
}

// ---------------------------------------------------------------------------
// Peers
// ---------------------------------------------------------------------------

/// A peer answered in-process by another chain's request handler. Requests
/// and answers go through JSON like on the wire.
pub struct LocalPeer {
    address: String,
    handler: PeerRequestHandler,
    corrupt_blocks: bool,
}

impl LocalPeer {
    pub fn new(address: &str, chain: Arc<Chain>) -> Self {
        Self {
            address: address.to_string(),
            handler: PeerRequestHandler::new(chain, 1440),
            corrupt_blocks: false,
        }
    }

    /// A peer whose block downloads do not match the ids it advertises.
    pub fn corrupting(address: &str, chain: Arc<Chain>) -> Self {
        Self {
            corrupt_blocks: true,
            ..Self::new(address, chain)
        }
    }
}

#[async_trait]
impl Peer for LocalPeer {
    fn address(&self) -> &str {
        &self.address
    }

    async fn request(&self, request: PeerRequest) -> Result<Value, NetworkError> {
        let corrupt = self.corrupt_blocks && matches!(request, PeerRequest::GetNextBlocks { .. });
        let encoded =
            serde_json::to_value(&request).map_err(|e| NetworkError::Encoding(e.to_string()))?;
        let mut answer = self.handler.handle_json(encoded);
        if corrupt {
            if let Some(blocks) = answer.as_array_mut() {
                for block in blocks {
                    block["totalFee"] = Value::from(999u64);
                }
            }
        }
        Ok(answer)
    }
}
