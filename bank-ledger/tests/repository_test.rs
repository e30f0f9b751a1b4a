//! Store CRUD and listing tests against PostgreSQL.
//!
//! Run with: TEST_DATABASE_URL=postgres://... cargo test -p bank-ledger -- --ignored

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bank_ledger::error::LedgerError;
use bank_ledger::models::{
    CreateAccount, CreateUser, Currency, ListEntriesParams, ListTransfersParams, Page,
    TransferParams,
};
use bank_ledger::services::Store;
use bank_ledger::startup::router;
use common::{create_random_account, random_owner, TestDb};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

fn new_user(username: &str) -> CreateUser {
    CreateUser {
        username: username.to_string(),
        hashed_password: "secret-hash".to_string(),
        full_name: "Test User".to_string(),
        email: format!("{}@example.com", username),
    }
}

#[tokio::test]
#[ignore]
async fn users_are_unique_by_username_and_email() {
    let test_db = TestDb::spawn().await;
    let store = test_db.store();

    let username = random_owner();
    let user = store.create_user(&new_user(&username)).await.unwrap();
    assert_eq!(user.username, username);
    assert_eq!(store.get_user(&username).await.unwrap(), user);

    let err = store.create_user(&new_user(&username)).await.unwrap_err();
    assert!(matches!(err, LedgerError::Conflict(_)), "{err}");

    let mut same_email = new_user(&random_owner());
    same_email.email = user.email.clone();
    let err = store.create_user(&same_email).await.unwrap_err();
    assert!(matches!(err, LedgerError::Conflict(_)), "{err}");

    let err = store.get_user("nobody").await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn accounts_are_unique_per_owner_and_currency() {
    let test_db = TestDb::spawn().await;
    let store = test_db.store();

    let owner = random_owner();
    store.create_user(&new_user(&owner)).await.unwrap();

    let usd = store
        .create_account(&CreateAccount::new(&owner, Currency::Usd))
        .await
        .unwrap();
    assert_eq!(usd.balance, 0);
    assert_eq!(usd.parsed_currency(), Some(Currency::Usd));

    let err = store
        .create_account(&CreateAccount::new(&owner, Currency::Usd))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Conflict(_)), "{err}");

    let eur = store
        .create_account(&CreateAccount::new(&owner, Currency::Eur))
        .await
        .unwrap();

    let listed = store.list_accounts(&owner, Page::default()).await.unwrap();
    assert_eq!(listed, vec![usd, eur]);

    let err = store
        .create_account(&CreateAccount::new("ghost", Currency::Cad))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)), "{err}");

    let err = store.get_account(i64::MAX).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn list_filters_and_pagination() {
    let test_db = TestDb::spawn().await;
    let ledger = test_db.ledger();
    let store = ledger.store();

    let a = create_random_account(store, 1_000).await;
    let b = create_random_account(store, 1_000).await;
    let c = create_random_account(store, 1_000).await;

    for _ in 0..10 {
        ledger
            .transfer_money(TransferParams::new(a.id, b.id, 10))
            .await
            .unwrap();
    }
    for _ in 0..5 {
        ledger
            .transfer_money(TransferParams::new(c.id, a.id, 10))
            .await
            .unwrap();
    }

    let second_page = Page::new(5, 5).unwrap();

    let both = store
        .list_transfers(&ListTransfersParams {
            from_account_id: Some(a.id),
            to_account_id: Some(b.id),
            page: second_page,
        })
        .await
        .unwrap();
    assert_eq!(both.len(), 5);
    assert!(both
        .iter()
        .all(|t| t.from_account_id == a.id && t.to_account_id == b.id));
    assert!(both.windows(2).all(|w| w[0].id < w[1].id));

    let from_only = store
        .list_transfers(&ListTransfersParams {
            from_account_id: Some(a.id),
            to_account_id: None,
            page: Page::new(100, 0).unwrap(),
        })
        .await
        .unwrap();
    assert_eq!(from_only.len(), 10);

    let to_only = store
        .list_transfers(&ListTransfersParams {
            from_account_id: None,
            to_account_id: Some(a.id),
            page: Page::new(100, 0).unwrap(),
        })
        .await
        .unwrap();
    assert_eq!(to_only.len(), 5);
    assert!(to_only.iter().all(|t| t.from_account_id == c.id));

    let unfiltered = store
        .list_transfers(&ListTransfersParams {
            page: Page::new(100, 0).unwrap(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(unfiltered.len(), 15);

    let a_entries = store
        .list_entries(&ListEntriesParams::for_account(a.id, second_page))
        .await
        .unwrap();
    assert_eq!(a_entries.len(), 5);
    assert!(a_entries.iter().all(|e| e.account_id == a.id));

    let past_the_end = store
        .list_entries(&ListEntriesParams::for_account(
            a.id,
            Page::new(5, 100).unwrap(),
        ))
        .await
        .unwrap();
    assert!(past_the_end.is_empty());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn health_endpoint_reports_ok_with_live_database() {
    let test_db = TestDb::spawn().await;

    let response = router(Arc::new(test_db.db.clone()))
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "bank-ledger");

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn entry_lookups_are_timed() {
    use bank_ledger::services::metrics::DB_QUERY_DURATION;

    let test_db = TestDb::spawn().await;
    let ledger = test_db.ledger();
    let store = ledger.store();

    let a = create_random_account(store, 100).await;
    let b = create_random_account(store, 100).await;
    let result = ledger
        .transfer_money(TransferParams::new(a.id, b.id, 10))
        .await
        .unwrap();

    let samples = || {
        DB_QUERY_DURATION
            .with_label_values(&["get_entry"])
            .get_sample_count()
    };
    let before = samples();
    assert_eq!(store.get_entry(result.to_entry.id).await.unwrap(), result.to_entry);
    assert_eq!(samples(), before + 1);

    test_db.cleanup().await;
}
