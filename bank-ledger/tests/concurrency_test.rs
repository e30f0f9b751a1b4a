//! Concurrent transfer tests against the in-memory store.
//!
//! These run by default; the PostgreSQL equivalents live in transfer_test.rs.

mod common;

use bank_ledger::models::{ListEntriesParams, ListTransfersParams, Page, TransferParams};
use bank_ledger::services::Store;
use common::{create_random_account, memory_ledger};
use futures::future::join_all;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

const DEADLINE: Duration = Duration::from_secs(10);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transfers_in_one_direction() {
    let (ledger, store) = memory_ledger();
    let ledger = Arc::new(ledger);
    let a = create_random_account(&store, 1_000).await;
    let b = create_random_account(&store, 1_000).await;

    let (a_id, b_id) = (a.id, b.id);
    let n = 10;
    let amount = 10;

    let handles = (0..n).map(|_| {
        let ledger = ledger.clone();
        tokio::spawn(async move {
            ledger
                .transfer_money(TransferParams::new(a_id, b_id, amount))
                .await
        })
    });

    let results = tokio::time::timeout(DEADLINE, join_all(handles))
        .await
        .expect("transfers did not finish");

    let mut seen_from_balances = Vec::new();
    for result in results {
        let result = result.unwrap().expect("transfer failed");

        assert_eq!(result.transfer.amount, amount);
        assert_eq!(result.from_entry.amount, -amount);
        assert_eq!(result.to_entry.amount, amount);

        // Each committed transfer sees the previous ones: the source balance
        // after it is 1000 - k * amount for a distinct k in 1..=n.
        let diff = 1_000 - result.from_account.balance;
        assert_eq!(diff, result.to_account.balance - 1_000);
        assert_eq!(diff % amount, 0);
        let k = diff / amount;
        assert!((1..=n).contains(&k));
        seen_from_balances.push(k);
    }
    seen_from_balances.sort_unstable();
    assert_eq!(seen_from_balances, (1..=n).collect::<Vec<_>>());

    let a = store.get_account(a.id).await.unwrap();
    let b = store.get_account(b.id).await.unwrap();
    assert_eq!(a.balance, 1_000 - n * amount);
    assert_eq!(b.balance, 1_000 + n * amount);

    let page = Page::new(100, 0).unwrap();
    let transfers = store
        .list_transfers(&ListTransfersParams {
            from_account_id: Some(a.id),
            to_account_id: Some(b.id),
            page,
        })
        .await
        .unwrap();
    assert_eq!(transfers.len(), n as usize);
    let entries = store
        .list_entries(&ListEntriesParams::for_account(a.id, page))
        .await
        .unwrap();
    assert_eq!(entries.len(), n as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_directions_do_not_deadlock() {
    let (ledger, store) = memory_ledger();
    let ledger = Arc::new(ledger);
    let a = create_random_account(&store, 500).await;
    let b = create_random_account(&store, 500).await;

    let (a_id, b_id) = (a.id, b.id);
    let n = 10;
    let amount = 10;

    let handles = (0..n).map(|i| {
        let ledger = ledger.clone();
        let (from, to) = if i % 2 == 0 { (a_id, b_id) } else { (b_id, a_id) };
        tokio::spawn(async move {
            ledger
                .transfer_money(TransferParams::new(from, to, amount))
                .await
        })
    });

    let results = tokio::time::timeout(DEADLINE, join_all(handles))
        .await
        .expect("opposite-direction transfers deadlocked");
    for result in results {
        result.unwrap().expect("transfer failed");
    }

    // Equal numbers each way cancel out.
    assert_eq!(store.get_account(a.id).await.unwrap().balance, 500);
    assert_eq!(store.get_account(b.id).await.unwrap().balance, 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn random_transfers_conserve_the_total() {
    let (ledger, store) = memory_ledger();
    let ledger = Arc::new(ledger);

    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(create_random_account(&store, 1_000).await.id);
    }

    let mut rng = rand::thread_rng();
    let mut expected = std::collections::HashMap::<i64, i64>::new();
    let mut requests = Vec::new();
    for _ in 0..40 {
        let from = ids[rng.gen_range(0..ids.len())];
        let mut to = ids[rng.gen_range(0..ids.len())];
        if to == from {
            to = ids[(ids.iter().position(|&id| id == from).unwrap() + 1) % ids.len()];
        }
        let amount = rng.gen_range(1..=25);
        *expected.entry(from).or_default() -= amount;
        *expected.entry(to).or_default() += amount;
        requests.push(TransferParams::new(from, to, amount));
    }

    let handles = requests.into_iter().map(|params| {
        let ledger = ledger.clone();
        tokio::spawn(async move { ledger.transfer_money(params).await })
    });

    let results = tokio::time::timeout(DEADLINE, join_all(handles))
        .await
        .expect("transfers did not finish");
    for result in results {
        result.unwrap().expect("transfer failed");
    }

    let mut total = 0;
    for id in &ids {
        let balance = store.get_account(*id).await.unwrap().balance;
        assert_eq!(balance, 1_000 + expected.get(id).copied().unwrap_or_default());
        total += balance;
    }
    assert_eq!(total, 4 * 1_000);

    let entries = store
        .list_entries(&ListEntriesParams {
            account_id: None,
            page: Page::new(100, 0).unwrap(),
        })
        .await
        .unwrap();
    assert_eq!(entries.iter().map(|e| e.amount).sum::<i64>(), 0);
}
