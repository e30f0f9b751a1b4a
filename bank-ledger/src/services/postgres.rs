//! PostgreSQL implementation of the store seam.

use crate::error::LedgerError;
use crate::models::{
    Account, CreateAccount, CreateUser, Entry, ListEntriesParams, ListTransfersParams, Page,
    Transfer, User,
};
use crate::services::repository;
use crate::services::store::{LedgerTx, Store};
use crate::services::Database;
use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

/// A PostgreSQL transaction at the default READ COMMITTED isolation level.
/// sqlx rolls it back when dropped uncommitted.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgTx {
    async fn get_account_for_update(&mut self, id: i64) -> Result<Account, LedgerError> {
        repository::get_account_for_update(&mut *self.tx, id).await
    }

    async fn add_account_balance(&mut self, id: i64, delta: i64) -> Result<Account, LedgerError> {
        repository::add_account_balance(&mut *self.tx, id, delta).await
    }

    async fn create_transfer(
        &mut self,
        from_account_id: i64,
        to_account_id: i64,
        amount: i64,
    ) -> Result<Transfer, LedgerError> {
        repository::create_transfer(&mut *self.tx, from_account_id, to_account_id, amount).await
    }

    async fn create_entry(&mut self, account_id: i64, amount: i64) -> Result<Entry, LedgerError> {
        repository::create_entry(&mut *self.tx, account_id, amount).await
    }

    async fn commit(self) -> Result<(), LedgerError> {
        self.tx.commit().await.map_err(|e| {
            LedgerError::Transaction(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        self.tx.rollback().await.map_err(|e| {
            LedgerError::Transaction(anyhow::anyhow!("Failed to roll back transaction: {}", e))
        })
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, LedgerError> {
        let tx = self.db.pool().begin().await.map_err(|e| {
            LedgerError::Transaction(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;
        Ok(PgTx { tx })
    }

    async fn create_user(&self, input: &CreateUser) -> Result<User, LedgerError> {
        repository::create_user(self.db.pool(), input).await
    }

    async fn get_user(&self, username: &str) -> Result<User, LedgerError> {
        repository::get_user(self.db.pool(), username).await
    }

    async fn create_account(&self, input: &CreateAccount) -> Result<Account, LedgerError> {
        repository::create_account(self.db.pool(), input).await
    }

    async fn get_account(&self, id: i64) -> Result<Account, LedgerError> {
        repository::get_account(self.db.pool(), id).await
    }

    async fn list_accounts(&self, owner: &str, page: Page) -> Result<Vec<Account>, LedgerError> {
        repository::list_accounts(self.db.pool(), owner, page).await
    }

    async fn get_entry(&self, id: i64) -> Result<Entry, LedgerError> {
        repository::get_entry(self.db.pool(), id).await
    }

    async fn list_entries(&self, params: &ListEntriesParams) -> Result<Vec<Entry>, LedgerError> {
        repository::list_entries(self.db.pool(), params).await
    }

    async fn get_transfer(&self, id: i64) -> Result<Transfer, LedgerError> {
        repository::get_transfer(self.db.pool(), id).await
    }

    async fn list_transfers(
        &self,
        params: &ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        repository::list_transfers(self.db.pool(), params).await
    }
}
