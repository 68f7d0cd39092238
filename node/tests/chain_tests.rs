//! Block acceptance, pop-off, rescan and pool behaviour of the chain
//! service, end to end over the in-memory store.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use strata_ledger::{DerivedState, RollbackError};
use strata_node::{
    BlockRejection, ChainError, ChainEvent, ChainEventKind, EventBus, PeerTransactionOutcome,
};
use strata_nullables::{NullClock, NullStore};
use strata_store::{ChainStore, ScanRecord, WriteBatch};
use strata_transactions::{Attachment, Phasing, Transaction, TransactionBuilder, TransactionError};

use common::*;

// ---------------------------------------------------------------------------
// Block acceptance
// ---------------------------------------------------------------------------

#[test]
fn open_writes_genesis_once() {
    let t = TestChain::new();
    assert_eq!(t.chain.height(), 0);
    assert_eq!(t.chain.last_block().id(), genesis().block().id());
    assert_eq!(t.chain.balance(account(&funded())), FUNDS);
    assert_eq!(t.store.block_count(), 1);

    let reopened = t.reopen();
    assert_eq!(reopened.chain.height(), 0);
    assert_eq!(t.store.block_count(), 1);
}

#[test]
fn stored_chain_keeps_linkage() {
    let t = TestChain::new();
    t.produce_n(&keypair(1), 5);
    assert_eq!(t.chain.height(), 5);

    for height in 1..=5 {
        let block = t.chain.block_at_height(height).unwrap().expect("block");
        let parent = t.chain.block_at_height(height - 1).unwrap().expect("parent");
        assert_eq!(block.previous_block_id, parent.id());
        assert!(block.timestamp > parent.timestamp);
        assert!(block.cumulative_difficulty > parent.cumulative_difficulty);
    }
}

#[test]
fn block_on_another_head_is_not_linked() {
    let a = TestChain::new();
    let b = TestChain::new();
    let blocks = b.produce_n(&keypair(1), 2);
    a.clock.set(b.clock_now().as_secs());

    let err = a.chain.push_block((*blocks[1]).clone()).unwrap_err();
    assert!(matches!(
        err,
        ChainError::BlockRejected {
            reason: BlockRejection::NotLinked { .. },
            ..
        }
    ));
    assert!(!err.is_peer_fault());
    assert_eq!(a.chain.height(), 0);
}

#[test]
fn pushing_the_head_again_is_a_duplicate() {
    let a = TestChain::new();
    let b = TestChain::new();
    let blocks = b.produce_n(&keypair(1), 1);
    replicate(&a, &blocks);

    let err = a.chain.push_block((*blocks[0]).clone()).unwrap_err();
    assert!(matches!(
        err,
        ChainError::BlockRejected {
            reason: BlockRejection::Duplicate,
            ..
        }
    ));
    assert_eq!(a.chain.height(), 1);
}

#[test]
fn tampered_block_is_a_peer_fault() {
    let t = TestChain::new();
    let mut block = t.assemble(&keypair(1), Vec::new());
    block.total_fee += 1;

    let err = t.chain.push_block(block).unwrap_err();
    assert!(err.is_peer_fault());
    assert_eq!(t.chain.height(), 0);
}

#[test]
fn block_from_the_future_is_rejected() {
    let t = TestChain::new();
    t.clock.advance(600);
    let block = t.assemble(&keypair(1), Vec::new());
    t.clock.set(START_SECS);

    let err = t.chain.push_block(block).unwrap_err();
    assert!(matches!(
        err,
        ChainError::BlockRejected {
            reason: BlockRejection::TimestampInFuture { .. },
            ..
        }
    ));
}

#[test]
fn failed_push_leaves_state_untouched() {
    let t = TestChain::new();
    let producer = keypair(1);
    let alice = keypair(2);
    t.produce_n(&producer, 2);
    t.chain
        .broadcast(t.payment(&funded(), account(&alice), 500))
        .expect("admit payment");

    let head = t.chain.last_block();
    let balance = t.chain.balance(account(&funded()));
    let unconfirmed = t.chain.unconfirmed_balance(account(&funded()));
    let pool = t.chain.unconfirmed_transaction_ids();
    let writes = t.store.write_count();

    t.store.fail_next_write();
    let ts = t.next_timestamp();
    let err = t.chain.generate_block(&producer, ts).unwrap_err();
    assert!(matches!(err, ChainError::Storage(_)));

    assert_eq!(t.chain.last_block().id(), head.id());
    assert_eq!(t.chain.height(), head.height);
    assert_eq!(t.chain.cumulative_difficulty(), head.cumulative_difficulty);
    assert_eq!(t.chain.balance(account(&funded())), balance);
    assert_eq!(t.chain.unconfirmed_balance(account(&funded())), unconfirmed);
    assert_eq!(t.chain.balance(account(&alice)), 0);
    assert_eq!(t.chain.unconfirmed_transaction_ids(), pool);
    assert_eq!(t.store.write_count(), writes);

    let block = t.produce(&producer);
    assert_eq!(block.transactions.len(), 1);
    assert_eq!(t.chain.balance(account(&alice)), 500);
}

#[test]
fn failed_push_rolls_back_external_derived_state() {
    let log = HeightLog::default();
    let t = TestChain::with_options(
        Arc::new(NullStore::new()),
        Arc::new(NullClock::new(START_SECS)),
        |options| options.with_derived_state(Box::new(log.clone())),
    );
    t.produce_n(&keypair(1), 3);

    t.store.fail_next_write();
    let ts = t.next_timestamp();
    assert!(t.chain.generate_block(&keypair(1), ts).is_err());
    assert_eq!(log.rollbacks().last(), Some(&3));

    t.chain.pop_off_to(1).expect("pop off");
    assert_eq!(log.rollbacks().last(), Some(&1));
}

#[test]
fn block_with_duplicate_alias_is_refused() {
    let t = TestChain::new();
    let first = t.transaction(
        &funded(),
        Attachment::AliasAssignment {
            alias: "strata".into(),
            uri: "https://one.example".into(),
        },
        |b| b,
    );
    let second = t.transaction(
        &funded(),
        Attachment::AliasAssignment {
            alias: "Strata".into(),
            uri: "https://two.example".into(),
        },
        |b| b,
    );
    let block = t.assemble(&keypair(1), vec![first, second.clone()]);

    let err = t.chain.push_block(block).unwrap_err();
    match err {
        ChainError::TransactionRejected { id, source } => {
            assert_eq!(id, second.id());
            assert!(matches!(source, TransactionError::DuplicateKey { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(t.chain.height(), 0);
    assert!(t.chain.alias("strata").is_none());
}

// ---------------------------------------------------------------------------
// Pool admission
// ---------------------------------------------------------------------------

#[test]
fn payment_beyond_unconfirmed_balance_is_not_admitted() {
    let t = TestChain::new();
    let producer = keypair(1);
    let poor = keypair(3);
    t.chain
        .broadcast(t.payment(&funded(), account(&poor), 999))
        .expect("fund account");
    t.produce(&producer);
    assert_eq!(t.chain.balance(account(&poor)), 999);

    let tx = t.payment(&poor, account(&funded()), 1000);
    let err = t.chain.broadcast(tx.clone()).unwrap_err();
    assert!(matches!(
        err,
        ChainError::TransactionRejected {
            source: TransactionError::InsufficientFunds,
            ..
        }
    ));
    assert!(!t.chain.is_admitted(tx.id()));
    assert_eq!(t.chain.unconfirmed_balance(account(&poor)), 999);
}

#[test]
fn same_transaction_is_admitted_once() {
    let t = TestChain::new();
    let tx = t.payment(&funded(), account(&keypair(2)), 100);

    t.chain.broadcast(tx.clone()).expect("first submission");
    let err = t.chain.broadcast(tx.clone()).unwrap_err();
    assert!(matches!(
        err,
        ChainError::TransactionRejected {
            source: TransactionError::AlreadyAdmitted,
            ..
        }
    ));
    assert_eq!(t.chain.unconfirmed_transaction_ids(), vec![tx.id()]);
    assert_eq!(
        t.chain.unconfirmed_balance(account(&funded())),
        FUNDS - 100 - FEE
    );
}

#[test]
fn confirmed_transaction_is_not_admitted_again() {
    let t = TestChain::new();
    let tx = t.payment(&funded(), account(&keypair(2)), 100);
    t.chain.broadcast(tx.clone()).expect("admit");
    t.produce(&keypair(1));
    assert_eq!(t.chain.transaction_height(tx.id()).unwrap(), Some(1));

    let err = t.chain.broadcast(tx).unwrap_err();
    assert!(matches!(
        err,
        ChainError::TransactionRejected {
            source: TransactionError::AlreadyConfirmed,
            ..
        }
    ));
}

#[test]
fn pool_refuses_second_claim_on_an_alias() {
    let t = TestChain::new();
    let other = keypair(5);
    t.chain
        .broadcast(t.payment(&funded(), account(&other), 50))
        .expect("fund");
    t.produce(&keypair(1));

    t.chain.broadcast(t.alias(&funded(), "gateway")).expect("first claim");
    let err = t.chain.broadcast(t.alias(&other, "gateway")).unwrap_err();
    assert!(matches!(
        err,
        ChainError::TransactionRejected {
            source: TransactionError::DuplicateKey { .. },
            ..
        }
    ));
}

#[test]
fn peer_transaction_from_the_future_waits() {
    let t = TestChain::new();
    t.clock.advance(300);
    let tx = t.payment(&funded(), account(&keypair(2)), 10);
    t.clock.set(START_SECS);

    let outcomes = t.chain.process_peer_transactions(vec![tx.clone()]);
    assert!(matches!(
        outcomes[0].1,
        PeerTransactionOutcome::Waiting(TransactionError::TimestampInFuture { .. })
    ));
    assert_eq!(t.chain.pool_sizes(), (0, 1));

    t.clock.set(START_SECS + 300);
    assert_eq!(t.chain.drain_waiting().unwrap(), 1);
    assert!(t.chain.is_admitted(tx.id()));
}

#[test]
fn permanently_invalid_peer_transaction_is_dropped() {
    let t = TestChain::new();
    let mut tx = t.payment(&funded(), account(&keypair(2)), 10);
    tx.amount += 1;

    let outcomes = t.chain.process_peer_transactions(vec![tx]);
    assert!(matches!(
        outcomes[0].1,
        PeerTransactionOutcome::Dropped(TransactionError::InvalidSignature)
    ));
    assert_eq!(t.chain.pool_sizes(), (0, 0));
}

#[test]
fn expired_transactions_are_swept() {
    let t = TestChain::new();
    let tx = t.transaction(&funded(), Attachment::OrdinaryPayment, |b| {
        b.recipient(account(&keypair(2))).amount(10).deadline(1)
    });
    t.chain.broadcast(tx.clone()).expect("admit");

    t.clock.advance(61);
    assert_eq!(t.chain.sweep_expired().unwrap(), 1);
    assert!(!t.chain.is_admitted(tx.id()));
    assert_eq!(t.chain.unconfirmed_balance(account(&funded())), FUNDS);
}

#[test]
fn requeue_and_drain_restore_the_admitted_table() {
    let t = TestChain::new();
    t.chain
        .broadcast(t.payment(&funded(), account(&keypair(2)), 10))
        .expect("admit");
    t.chain
        .broadcast(t.payment(&funded(), account(&keypair(3)), 20))
        .expect("admit");

    assert_eq!(t.chain.requeue_all().unwrap(), 2);
    assert_eq!(t.chain.pool_sizes(), (0, 2));
    assert_eq!(t.chain.unconfirmed_balance(account(&funded())), FUNDS);

    assert_eq!(t.chain.drain_waiting().unwrap(), 2);
    assert_eq!(t.chain.pool_sizes(), (2, 0));
    assert_eq!(
        t.chain.unconfirmed_balance(account(&funded())),
        FUNDS - 30 - 2 * FEE
    );
}

#[test]
fn pool_events_are_published() {
    let events = Arc::new(EventBus::new());
    let added = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&added);
    events.subscribe(ChainEventKind::AddedUnconfirmedTransactions, move |event| {
        if let ChainEvent::AddedUnconfirmedTransactions(txs) = event {
            counter.fetch_add(txs.len(), Ordering::SeqCst);
        }
    });
    let t = TestChain::with_options(
        Arc::new(NullStore::new()),
        Arc::new(NullClock::new(START_SECS)),
        |options| options.with_events(events),
    );

    t.chain
        .broadcast(t.payment(&funded(), account(&keypair(2)), 10))
        .expect("admit");
    assert_eq!(added.load(Ordering::SeqCst), 1);
}

/// A chain whose admitted table holds a single transaction.
fn single_slot_pool() -> TestChain {
    TestChain::with_options(
        Arc::new(NullStore::new()),
        Arc::new(NullClock::new(START_SECS)),
        |mut options| {
            options.max_unconfirmed_transactions = 1;
            options
        },
    )
}

fn payment_with_fee(t: &TestChain, seed: u8, fee: u64) -> Transaction {
    t.transaction(&funded(), Attachment::OrdinaryPayment, |b| {
        b.recipient(account(&keypair(seed))).amount(10).fee(fee)
    })
}

#[test]
fn higher_fee_displaces_the_cheapest_admitted() {
    let t = single_slot_pool();
    let removed = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&removed);
    t.chain
        .events()
        .subscribe(ChainEventKind::RemovedUnconfirmedTransactions, move |event| {
            if let ChainEvent::RemovedUnconfirmedTransactions(txs) = event {
                seen.lock().unwrap().extend(txs.iter().map(|tx| tx.id()));
            }
        });

    let cheap = payment_with_fee(&t, 2, 1);
    let dear = payment_with_fee(&t, 3, 10_000);
    t.chain.broadcast(cheap.clone()).expect("admit cheap");
    t.chain.broadcast(dear.clone()).expect("dear displaces cheap");

    assert!(t.chain.is_admitted(dear.id()));
    assert!(!t.chain.is_admitted(cheap.id()));
    assert_eq!(t.chain.pool_sizes(), (1, 1));
    assert_eq!(*removed.lock().unwrap(), vec![cheap.id()]);
    assert_eq!(
        t.chain.unconfirmed_balance(account(&funded())),
        FUNDS - 10 - 10_000
    );

    // The displaced payment cannot take the slot back while it is held.
    let block = t.produce(&keypair(1));
    assert_eq!(block.transaction_ids(), vec![dear.id()]);
}

#[test]
fn full_pool_refuses_a_lower_priority_transaction() {
    let t = single_slot_pool();
    let dear = payment_with_fee(&t, 3, 10_000);
    t.chain.broadcast(dear.clone()).expect("admit dear");
    let reserved = t.chain.unconfirmed_balance(account(&funded()));

    let cheap = payment_with_fee(&t, 2, 1);
    let err = t.chain.broadcast(cheap.clone()).unwrap_err();
    assert!(matches!(
        err,
        ChainError::TransactionRejected {
            source: TransactionError::PoolFull,
            ..
        }
    ));
    assert!(t.chain.is_admitted(dear.id()));
    assert_eq!(t.chain.pool_sizes(), (1, 0));
    assert_eq!(t.chain.unconfirmed_balance(account(&funded())), reserved);

    // The same transaction from a peer is kept for later.
    let outcomes = t.chain.process_peer_transactions(vec![cheap.clone()]);
    assert_eq!(
        outcomes,
        vec![(cheap.id(), PeerTransactionOutcome::Waiting(TransactionError::PoolFull))]
    );
    assert_eq!(t.chain.pool_sizes(), (1, 1));
}

#[test]
fn block_is_filled_highest_priority_first() {
    let t = TestChain::with_options(
        Arc::new(NullStore::new()),
        Arc::new(NullClock::new(START_SECS)),
        |mut options| {
            options.params.max_transactions_per_block = 1;
            options
        },
    );
    let cheap = payment_with_fee(&t, 2, 1);
    let dear = payment_with_fee(&t, 3, 10_000);
    t.chain.broadcast(cheap.clone()).expect("admit cheap");
    t.chain.broadcast(dear.clone()).expect("admit dear");
    assert_eq!(t.chain.unconfirmed_transaction_ids(), vec![dear.id(), cheap.id()]);

    let block = t.produce(&keypair(1));
    assert_eq!(block.transaction_ids(), vec![dear.id()]);
}

// ---------------------------------------------------------------------------
// Pop-off and rescan
// ---------------------------------------------------------------------------

#[test]
fn pop_off_then_push_back_restores_the_head() {
    let t = TestChain::new();
    let producer = keypair(1);
    t.produce_n(&producer, 3);
    t.chain
        .broadcast(t.payment(&funded(), account(&keypair(2)), 100))
        .expect("admit");
    t.produce_n(&producer, 3);

    let head = t.chain.last_block();
    let balance = t.chain.balance(account(&keypair(2)));

    let popped = t.chain.pop_off_to(3).expect("pop off");
    assert_eq!(popped.len(), 3);
    assert_eq!(popped[0].height, 4);
    assert_eq!(t.chain.height(), 3);
    assert_eq!(t.chain.balance(account(&keypair(2))), 0);
    assert_eq!(t.chain.pool_sizes(), (0, 1));

    for block in &popped {
        t.chain.push_block((**block).clone()).expect("push back");
    }
    assert_eq!(t.chain.last_block().id(), head.id());
    assert_eq!(t.chain.height(), head.height);
    assert_eq!(t.chain.cumulative_difficulty(), head.cumulative_difficulty);
    assert_eq!(t.chain.balance(account(&keypair(2))), balance);
    assert_eq!(t.chain.pool_sizes(), (0, 0));
}

#[test]
fn popped_blocks_are_announced_from_the_top() {
    let t = TestChain::new();
    t.produce_n(&keypair(1), 4);
    let heights = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&heights);
    t.chain
        .events()
        .subscribe(ChainEventKind::BlockPopped, move |event| {
            if let Some(block) = event.block() {
                seen.lock().unwrap().push(block.height);
            }
        });

    t.chain.pop_off_to(1).expect("pop off");
    assert_eq!(*heights.lock().unwrap(), vec![4, 3, 2]);
}

#[test]
fn pop_off_below_history_rescans() {
    let t = TestChain::with_options(
        Arc::new(NullStore::new()),
        Arc::new(NullClock::new(START_SECS)),
        |mut options| {
            options.trim_frequency = 1;
            options
        },
    );
    t.chain
        .broadcast(t.payment(&funded(), account(&keypair(2)), 70))
        .expect("admit");
    t.produce_n(&keypair(1), 14);
    assert_eq!(t.chain.trim(), Some(4));
    assert_eq!(t.chain.min_rollback_height(), 4);

    let popped = t.chain.pop_off_to(2).expect("pop off");
    assert_eq!(popped.len(), 12);
    assert_eq!(t.chain.height(), 2);
    assert_eq!(t.store.block_count(), 3);
    assert_eq!(t.chain.balance(account(&keypair(2))), 70);
    assert_eq!(t.chain.min_rollback_height(), 0);
}

#[test]
fn validating_rescan_is_idempotent() {
    let t = TestChain::new();
    let producer = keypair(1);
    t.chain
        .broadcast(t.payment(&funded(), account(&keypair(2)), 250))
        .expect("admit");
    t.produce_n(&producer, 4);
    t.chain
        .broadcast(t.alias(&funded(), "anchor"))
        .expect("admit");
    t.produce_n(&producer, 2);

    let head = t.chain.last_block();
    t.chain.rescan(0, true).expect("rescan");

    assert_eq!(t.chain.last_block().id(), head.id());
    assert_eq!(t.chain.cumulative_difficulty(), head.cumulative_difficulty);
    assert_eq!(t.chain.balance(account(&keypair(2))), 250);
    assert_eq!(t.chain.balance(account(&producer)), 2 * FEE);
    assert!(t.chain.alias("anchor").is_some());
    assert!(t.store.scan_record().unwrap().is_none());
}

#[test]
fn interrupted_rescan_resumes_on_open() {
    let t = TestChain::new();
    t.chain
        .broadcast(t.payment(&funded(), account(&keypair(2)), 40))
        .expect("admit");
    t.produce_n(&keypair(1), 4);
    let head = t.chain.last_block();

    let mut batch = WriteBatch::new();
    batch.put_scan_record(ScanRecord::pending(2, true));
    t.store.write(batch).expect("write scan record");

    let events = Arc::new(EventBus::new());
    let rescans = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&rescans);
    events.subscribe(ChainEventKind::RescanEnd, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let reopened = TestChain::with_options(Arc::clone(&t.store), Arc::clone(&t.clock), |options| {
        options.with_events(events)
    });

    assert_eq!(rescans.load(Ordering::SeqCst), 1);
    assert_eq!(reopened.chain.last_block().id(), head.id());
    assert_eq!(reopened.chain.balance(account(&keypair(2))), 40);
    assert!(t.store.scan_record().unwrap().is_none());
}

#[test]
fn rescan_drops_a_stored_block_that_no_longer_applies() {
    let t = TestChain::new();
    let blocks = t.produce_n(&keypair(1), 5);
    let above = blocks[3].id();
    assert!(t.chain.block(above).unwrap().is_some());

    let mut tampered = t.chain.block_at_height(3).unwrap().expect("block 3");
    tampered.total_fee += 1;
    let mut batch = WriteBatch::new();
    batch.put_block(tampered);
    t.store.write(batch).expect("overwrite block 3");

    t.chain.rescan(0, true).expect("rescan recovers");
    assert_eq!(t.chain.height(), 2);
    assert_eq!(t.chain.last_block().id(), blocks[1].id());
    assert_eq!(t.store.block_count(), 3);
    assert!(!t.chain.has_block(above).unwrap());
    assert!(t.chain.block(above).unwrap().is_none());
    assert!(t.store.scan_record().unwrap().is_none());

    // The chain keeps growing from the last good block.
    let next = t.produce(&keypair(1));
    assert_eq!(next.height, 3);
}

#[test]
fn popped_blocks_leave_the_block_cache() {
    let t = TestChain::new();
    let blocks = t.produce_n(&keypair(1), 3);
    let top = blocks[2].id();
    assert!(t.chain.has_block(top).unwrap());
    assert!(t.chain.block(top).unwrap().is_some());

    t.chain.pop_off_to(1).expect("pop off");
    assert!(!t.chain.has_block(top).unwrap());
    assert!(t.chain.block(top).unwrap().is_none());
    assert!(t.chain.block(blocks[0].id()).unwrap().is_some());
}

#[test]
fn open_refuses_a_foreign_genesis() {
    let t = TestChain::new();
    let other = strata_ledger::Genesis::single(account(&keypair(9)), 5);
    let store: Arc<dyn ChainStore> = t.store.clone();
    let result = strata_node::Chain::open(
        store,
        strata_node::ChainOptions::new(dev_params(), other),
    );
    assert!(matches!(result, Err(ChainError::ReplayDivergence { height: 0, .. })));
}

// ---------------------------------------------------------------------------
// Event delivery
// ---------------------------------------------------------------------------

#[test]
fn block_handlers_may_read_the_chain() {
    let t = TestChain::new();
    let chain = Arc::clone(&t.chain);
    let (sender, heights) = mpsc::channel();
    let sender = Mutex::new(sender);
    t.chain
        .events()
        .subscribe(ChainEventKind::BlockPushed, move |_| {
            let _ = sender.lock().unwrap().send(chain.height());
        });

    let producer = thread::spawn(move || {
        t.produce(&keypair(1));
    });
    let seen = heights
        .recv_timeout(Duration::from_secs(3))
        .expect("handler ran while the block was pushed");
    assert_eq!(seen, 1);
    producer.join().expect("producer thread");
}

#[test]
fn pool_handlers_may_read_the_pool() {
    let t = TestChain::new();
    let chain = Arc::clone(&t.chain);
    let admitted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&admitted);
    t.chain
        .events()
        .subscribe(ChainEventKind::AddedUnconfirmedTransactions, move |event| {
            if let ChainEvent::AddedUnconfirmedTransactions(txs) = event {
                let visible = txs.iter().filter(|tx| chain.is_admitted(tx.id())).count();
                counter.fetch_add(visible, Ordering::SeqCst);
            }
        });

    t.chain
        .process_peer_transactions(vec![t.payment(&funded(), account(&keypair(2)), 10)]);
    t.chain.requeue_all().expect("requeue");
    assert_eq!(t.chain.drain_waiting().unwrap(), 1);
    assert_eq!(admitted.load(Ordering::SeqCst), 2);
}

#[test]
fn refused_block_announces_no_application() {
    let t = TestChain::new();
    let applied = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&applied);
    t.chain.events().subscribe_all(
        &[ChainEventKind::BeforeBlockApply, ChainEventKind::BlockPushed],
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );

    t.store.fail_next_write();
    let ts = t.next_timestamp();
    assert!(t.chain.generate_block(&keypair(1), ts).is_err());
    assert_eq!(applied.load(Ordering::SeqCst), 0);

    t.produce(&keypair(1));
    assert_eq!(applied.load(Ordering::SeqCst), 2);
}

// ---------------------------------------------------------------------------
// Phasing
// ---------------------------------------------------------------------------

#[test]
fn phased_payment_is_released_by_quorum() {
    let t = TestChain::new();
    let producer = keypair(1);
    let bob = keypair(3);
    let voter = keypair(4);
    t.chain
        .broadcast(t.payment(&funded(), account(&voter), 10))
        .expect("fund voter");
    t.produce(&producer);

    let released = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&released);
    t.chain
        .events()
        .subscribe(ChainEventKind::ReleasePhasedTransaction, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    let finish_height = t.chain.height() + 5;
    let phased = t.transaction(&funded(), Attachment::OrdinaryPayment, |b| {
        b.recipient(account(&bob)).amount(500).phasing(Phasing {
            finish_height,
            quorum: 1,
        })
    });
    t.chain.broadcast(phased.clone()).expect("admit phased");
    t.produce(&producer);
    assert!(t.chain.poll(&phased.full_hash()).is_some());
    assert_eq!(t.chain.balance(account(&bob)), 0);

    let vote = t.transaction(
        &voter,
        Attachment::PhasingVote {
            transactions: vec![phased.full_hash()],
        },
        |b| b,
    );
    t.chain.broadcast(vote).expect("admit vote");
    t.produce(&producer);

    assert_eq!(t.chain.balance(account(&bob)), 500);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn phased_payment_without_votes_is_returned() {
    let t = TestChain::new();
    let producer = keypair(1);
    let bob = keypair(3);
    let finish_height = t.chain.height() + 2;
    let phased = t.transaction(&funded(), Attachment::OrdinaryPayment, |b| {
        b.recipient(account(&bob)).amount(500).phasing(Phasing {
            finish_height,
            quorum: 1,
        })
    });
    t.chain.broadcast(phased).expect("admit phased");
    t.produce_n(&producer, 3);

    assert_eq!(t.chain.balance(account(&bob)), 0);
    assert_eq!(t.chain.balance(account(&funded())), FUNDS - FEE);
    assert_eq!(
        t.chain.unconfirmed_balance(account(&funded())),
        FUNDS - FEE
    );
}

#[test]
fn phasing_beyond_the_limit_is_not_currently_valid() {
    let t = TestChain::new();
    let limit = t.chain.params().max_phasing_duration;
    let tx = TransactionBuilder::new(Attachment::OrdinaryPayment, t.clock_now())
        .recipient(account(&keypair(2)))
        .amount(5)
        .fee(FEE)
        .ec_block(0, genesis().block().id())
        .phasing(Phasing {
            finish_height: limit + 10,
            quorum: 1,
        })
        .sign(&funded());

    let err = t.chain.broadcast(tx).unwrap_err();
    match err {
        ChainError::TransactionRejected { source, .. } => assert!(!source.is_permanent()),
        other => panic!("unexpected error: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Derived state that only records the calls it receives.
#[derive(Clone, Default)]
struct HeightLog {
    calls: Arc<Mutex<Vec<u32>>>,
}

impl HeightLog {
    fn rollbacks(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

impl DerivedState for HeightLog {
    fn name(&self) -> &'static str {
        "height_log"
    }

    fn trim(&mut self, _height: u32) {}

    fn rollback(&mut self, height: u32) -> Result<(), RollbackError> {
        self.calls.lock().unwrap().push(height);
        Ok(())
    }

    fn truncate(&mut self) {}
}
