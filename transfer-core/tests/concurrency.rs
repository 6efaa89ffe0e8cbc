//! Concurrency tests for the transfer engine
//!
//! Exercises the guarantees that only hold under contention: no
//! over-withdrawal under any interleaving, deadlock freedom for opposed
//! transfer pairs, and at-most-once application for duplicate submissions.

use rust_decimal::Decimal;
use std::sync::Arc;
use transfer_core::{
    Account, AccountType, Config, FailureReason, TransferOrchestrator, TransferRequest,
    TransferStatus, UserId,
};

fn test_engine(temp_dir: &tempfile::TempDir) -> Arc<TransferOrchestrator> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("transfer_core=warn")
        .try_init();

    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    // Generous lock wait so slow CI machines do not turn contention into
    // spurious ConcurrencyExhausted outcomes
    config.transfer.lock_timeout_ms = 5_000;

    Arc::new(TransferOrchestrator::open(config).unwrap())
}

async fn open_funded(engine: &TransferOrchestrator, cents: i64) -> Account {
    let account = engine
        .open_account(UserId::generate(), AccountType::Checking)
        .unwrap();
    if cents > 0 {
        engine
            .deposit(account.id, Decimal::new(cents, 2))
            .await
            .unwrap()
    } else {
        account
    }
}

fn request(from: &Account, to: &Account, cents: i64, key: String) -> TransferRequest {
    TransferRequest {
        from_number: from.number.clone(),
        to_number: to.number.clone(),
        amount: Decimal::new(cents, 2),
        description: String::new(),
        idempotency_key: key,
    }
}

/// N concurrent debits summing past the source balance: exactly the subset
/// that fits succeeds, the rest fail with InsufficientFunds, and the source
/// never goes negative.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_no_over_withdrawal_under_contention() {
    let temp_dir = tempfile::tempdir().unwrap();
    let engine = test_engine(&temp_dir);

    let source = open_funded(&engine, 100_00).await;
    let mut destinations = Vec::new();
    for _ in 0..10 {
        destinations.push(open_funded(&engine, 0).await);
    }

    // 10 transfers of 30.00 against a 100.00 balance: exactly 3 fit
    let mut handles = Vec::new();
    for (i, dest) in destinations.iter().enumerate() {
        let engine = engine.clone();
        let req = request(&source, dest, 30_00, format!("contended-{}", i));
        handles.push(tokio::spawn(async move {
            engine.initiate_transfer(req).await.unwrap()
        }));
    }

    let mut applied = 0;
    let mut insufficient = 0;
    for handle in handles {
        let outcome = handle.await.unwrap();
        match outcome.status {
            TransferStatus::Applied => applied += 1,
            TransferStatus::Failed => {
                assert_eq!(outcome.reason, Some(FailureReason::InsufficientFunds));
                insufficient += 1;
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    assert_eq!(applied, 3);
    assert_eq!(insufficient, 7);

    let source_after = engine.get_account(&source.number).unwrap();
    assert_eq!(source_after.balance, Decimal::new(10_00, 2));
    assert!(source_after.balance >= Decimal::ZERO);

    // Conservation across the whole run
    let mut total = source_after.balance;
    for dest in &destinations {
        total += engine.get_account(&dest.number).unwrap().balance;
    }
    assert_eq!(total, Decimal::new(100_00, 2));
}

/// Opposed transfers A->B and B->A complete without deadlock regardless of
/// submission order (fixed lock ordering by account id).
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposed_transfers_no_deadlock() {
    let temp_dir = tempfile::tempdir().unwrap();
    let engine = test_engine(&temp_dir);

    let a = open_funded(&engine, 500_00).await;
    let b = open_funded(&engine, 500_00).await;

    let rounds = 25;
    let e1 = engine.clone();
    let (a1, b1) = (a.clone(), b.clone());
    let forward = tokio::spawn(async move {
        for i in 0..rounds {
            let outcome = e1
                .initiate_transfer(request(&a1, &b1, 10_00, format!("fwd-{}", i)))
                .await
                .unwrap();
            assert_eq!(outcome.status, TransferStatus::Applied);
        }
    });

    let e2 = engine.clone();
    let (a2, b2) = (a.clone(), b.clone());
    let backward = tokio::spawn(async move {
        for i in 0..rounds {
            let outcome = e2
                .initiate_transfer(request(&b2, &a2, 10_00, format!("bwd-{}", i)))
                .await
                .unwrap();
            assert_eq!(outcome.status, TransferStatus::Applied);
        }
    });

    forward.await.unwrap();
    backward.await.unwrap();

    // Equal amounts both ways: balances end where they started
    assert_eq!(
        engine.get_account(&a.number).unwrap().balance,
        Decimal::new(500_00, 2)
    );
    assert_eq!(
        engine.get_account(&b.number).unwrap().balance,
        Decimal::new(500_00, 2)
    );
}

/// Concurrent submissions of the same idempotency key apply at most once.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_duplicate_key_applies_once() {
    let temp_dir = tempfile::tempdir().unwrap();
    let engine = test_engine(&temp_dir);

    let a = open_funded(&engine, 100_00).await;
    let b = open_funded(&engine, 0).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        let req = request(&a, &b, 30_00, "duplicated".to_string());
        handles.push(tokio::spawn(async move {
            engine.initiate_transfer(req).await.unwrap()
        }));
    }

    let mut applied = 0;
    for handle in handles {
        let outcome = handle.await.unwrap();
        // A racer that loses the keyed append replays the winning attempt;
        // it may still observe it in flight.
        match outcome.status {
            TransferStatus::Applied => applied += 1,
            TransferStatus::Pending => {}
            other => panic!("unexpected status {:?}", other),
        }
    }
    assert!(applied >= 1);

    // Exactly one debit happened
    assert_eq!(
        engine.get_account(&a.number).unwrap().balance,
        Decimal::new(70_00, 2)
    );
    assert_eq!(
        engine.get_account(&b.number).unwrap().balance,
        Decimal::new(30_00, 2)
    );
}

/// Deposits racing a transfer settle on consistent totals: every version
/// bump lands, nothing is lost to a torn read.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deposits_race_transfers_conserve_total() {
    let temp_dir = tempfile::tempdir().unwrap();
    let engine = test_engine(&temp_dir);

    let a = open_funded(&engine, 100_00).await;
    let b = open_funded(&engine, 0).await;

    let e1 = engine.clone();
    let a_id = a.id;
    let depositor = tokio::spawn(async move {
        for _ in 0..20 {
            e1.deposit(a_id, Decimal::new(5_00, 2)).await.unwrap();
        }
    });

    let e2 = engine.clone();
    let (a2, b2) = (a.clone(), b.clone());
    let transferrer = tokio::spawn(async move {
        for i in 0..20 {
            let outcome = e2
                .initiate_transfer(request(&a2, &b2, 5_00, format!("race-{}", i)))
                .await
                .unwrap();
            assert_eq!(outcome.status, TransferStatus::Applied);
        }
    });

    depositor.await.unwrap();
    transferrer.await.unwrap();

    // 100.00 start + 100.00 deposited; transfers conserve
    let total = engine.get_account(&a.number).unwrap().balance
        + engine.get_account(&b.number).unwrap().balance;
    assert_eq!(total, Decimal::new(200_00, 2));
    assert_eq!(
        engine.get_account(&b.number).unwrap().balance,
        Decimal::new(100_00, 2)
    );
}
