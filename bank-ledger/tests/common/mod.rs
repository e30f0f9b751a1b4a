//! Common test utilities for bank-ledger integration tests.
//!
//! PostgreSQL tests need `TEST_DATABASE_URL` and run with `--ignored`; each
//! one gets its own schema so table-wide counts stay exact.

#![allow(dead_code)]

use bank_ledger::config::DatabaseConfig;
use bank_ledger::models::{Account, CreateAccount, CreateUser, Currency};
use bank_ledger::services::{Database, LedgerStore, MemoryStore, PgStore, Store};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Once;

static INIT: Once = Once::new();

static SCHEMA_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,bank_ledger=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn random_owner() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("owner_{}", suffix.to_lowercase())
}

/// Create a user with a random name and one USD account for it.
pub async fn create_random_account<S: Store>(store: &S, balance: i64) -> Account {
    let owner = random_owner();
    store
        .create_user(&CreateUser {
            username: owner.clone(),
            hashed_password: "secret-hash".to_string(),
            full_name: format!("Test {}", owner),
            email: format!("{}@example.com", owner),
        })
        .await
        .expect("Failed to create user");

    store
        .create_account(&CreateAccount::new(&owner, Currency::Usd).with_balance(balance))
        .await
        .expect("Failed to create account")
}

pub fn memory_ledger() -> (LedgerStore<MemoryStore>, MemoryStore) {
    init_tracing();
    let store = MemoryStore::new();
    (LedgerStore::new(store.clone()), store)
}

fn unique_schema_name() -> String {
    let counter = SCHEMA_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("test_ledger_{}_{}", std::process::id(), counter)
}

/// A migrated, schema-isolated PostgreSQL ledger.
pub struct TestDb {
    pub db: Database,
    pub schema_name: String,
    base_url: String,
}

impl TestDb {
    pub async fn spawn() -> Self {
        init_tracing();
        dotenvy::dotenv().ok();

        let base_url = std::env::var("TEST_DATABASE_URL")
            .expect("TEST_DATABASE_URL must be set to run PostgreSQL tests");
        let schema_name = unique_schema_name();

        let setup = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&base_url)
            .await
            .expect("Failed to connect to test database");
        sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema_name))
            .execute(&setup)
            .await
            .ok();
        sqlx::query(&format!("CREATE SCHEMA {}", schema_name))
            .execute(&setup)
            .await
            .expect("Failed to create test schema");
        setup.close().await;

        let separator = if base_url.contains('?') { "&" } else { "?" };
        let config = DatabaseConfig {
            url: format!(
                "{}{}options=-c search_path%3D{}",
                base_url, separator, schema_name
            ),
            max_connections: 12,
            min_connections: 1,
        };

        let db = Database::new(&config)
            .await
            .expect("Failed to connect to test schema");
        db.run_migrations()
            .await
            .expect("Failed to run migrations");

        Self {
            db,
            schema_name,
            base_url,
        }
    }

    pub fn store(&self) -> PgStore {
        PgStore::new(self.db.clone())
    }

    pub fn ledger(&self) -> LedgerStore<PgStore> {
        LedgerStore::new(self.store())
    }

    pub async fn cleanup(&self) {
        self.db.pool().close().await;

        if let Ok(pool) = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&self.base_url)
            .await
        {
            let _ = sqlx::query(&format!(
                "DROP SCHEMA IF EXISTS {} CASCADE",
                self.schema_name
            ))
            .execute(&pool)
            .await;
            pool.close().await;
        }
    }
}
