use strata_crypto::{account_id, keypair_from_seed};
use strata_ledger::{Block, Genesis};
use strata_store::{ChainStore, ScanRecord, WriteBatch};
use strata_store_lmdb::{check_integrity, LmdbChainStore, LmdbEnvironment};
use strata_transactions::{Attachment, Transaction, TransactionBuilder};
use strata_types::{KeyPair, ONE_COIN};

const MAP_SIZE: usize = 1 << 26;

fn open(dir: &std::path::Path) -> LmdbChainStore {
    LmdbChainStore::new(LmdbEnvironment::open(dir, MAP_SIZE).unwrap())
}

fn payment(sender: &KeyPair, recipient: &KeyPair, genesis: &Block, nonce: u64) -> Transaction {
    TransactionBuilder::new(Attachment::OrdinaryPayment, genesis.timestamp.plus_secs(nonce))
        .recipient(account_id(&recipient.public))
        .amount(ONE_COIN)
        .fee(ONE_COIN)
        .sign(sender)
}

/// Genesis plus two linked children; the second child carries `txs`.
fn chain(txs: Vec<Transaction>) -> Vec<Block> {
    let producer = keypair_from_seed(&[3u8; 32]);
    let genesis = Genesis::single(account_id(&producer.public), 1_000 * ONE_COIN).block();
    let mut first = Block::assemble(
        1,
        &genesis,
        genesis.timestamp.plus_secs(60),
        Vec::new(),
        &producer,
        [1u8; 32],
        genesis.base_target,
    )
    .unwrap();
    first.link_to(&genesis);
    let mut second = Block::assemble(
        1,
        &first,
        first.timestamp.plus_secs(60),
        txs,
        &producer,
        [2u8; 32],
        first.base_target,
    )
    .unwrap();
    second.link_to(&first);
    vec![genesis, first, second]
}

fn store_all(store: &LmdbChainStore, blocks: &[Block]) {
    let mut batch = WriteBatch::new();
    for block in blocks {
        batch.put_block(block.clone());
    }
    store.write(batch).unwrap();
}

#[test]
fn empty_store_has_no_head() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    assert!(store.last_block().unwrap().is_none());
    assert!(store.scan_record().unwrap().is_none());
}

#[test]
fn blocks_and_transactions_are_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let alice = keypair_from_seed(&[10u8; 32]);
    let bob = keypair_from_seed(&[11u8; 32]);
    let genesis = Genesis::single(account_id(&alice.public), 1).block();
    let tx = payment(&alice, &bob, &genesis, 5);
    let blocks = chain(vec![tx.clone()]);
    store_all(&store, &blocks);

    let head = store.last_block().unwrap().unwrap();
    assert_eq!(head.id(), blocks[2].id());
    assert_eq!(head.height, 2);
    assert_eq!(store.block_id_at_height(1).unwrap(), Some(blocks[1].id()));
    assert_eq!(store.block_at_height(0).unwrap().unwrap(), blocks[0]);

    assert_eq!(store.transaction(tx.id()).unwrap(), Some(tx.clone()));
    assert_eq!(store.transaction_height(tx.id()).unwrap(), Some(2));
    assert_eq!(
        store.transaction_height_by_full_hash(&tx.full_hash()).unwrap(),
        Some(2)
    );

    let after_genesis = store.block_ids_after(blocks[0].id(), 10).unwrap();
    assert_eq!(after_genesis, vec![blocks[1].id(), blocks[2].id()]);
    let limited = store.blocks_from_height(0, 2).unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[1].height, 1);
}

#[test]
fn delete_from_height_removes_blocks_and_transaction_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let alice = keypair_from_seed(&[10u8; 32]);
    let bob = keypair_from_seed(&[11u8; 32]);
    let genesis = Genesis::single(account_id(&alice.public), 1).block();
    let tx = payment(&alice, &bob, &genesis, 7);
    let blocks = chain(vec![tx.clone()]);
    store_all(&store, &blocks);

    let mut batch = WriteBatch::new();
    batch.delete_blocks_from(2);
    store.write(batch).unwrap();

    assert_eq!(store.last_block().unwrap().unwrap().id(), blocks[1].id());
    assert!(!store.has_block(blocks[2].id()).unwrap());
    assert!(!store.has_transaction(tx.id()).unwrap());
    assert!(store
        .transaction_height_by_full_hash(&tx.full_hash())
        .unwrap()
        .is_none());

    let report = check_integrity(store.environment().env()).unwrap();
    assert!(report.is_healthy(), "{:?}", report.errors);
}

#[test]
fn scan_record_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = open(dir.path());
        store_all(&store, &chain(Vec::new()));
        let mut batch = WriteBatch::new();
        batch.put_scan_record(ScanRecord::pending(1, true));
        store.write(batch).unwrap();
    }

    let store = open(dir.path());
    assert_eq!(store.scan_record().unwrap(), Some(ScanRecord::pending(1, true)));
    assert_eq!(store.last_block().unwrap().unwrap().height, 2);

    let mut batch = WriteBatch::new();
    batch.clear_scan_record();
    store.write(batch).unwrap();
    assert!(store.scan_record().unwrap().is_none());
}

#[test]
fn batch_is_applied_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(dir.path());
    let blocks = chain(Vec::new());

    let mut batch = WriteBatch::new();
    batch
        .put_block(blocks[0].clone())
        .put_block(blocks[1].clone())
        .delete_blocks_from(1)
        .put_block(blocks[1].clone());
    store.write(batch).unwrap();

    assert_eq!(store.last_block().unwrap().unwrap().id(), blocks[1].id());
}
