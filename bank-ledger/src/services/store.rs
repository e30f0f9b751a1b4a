//! The seam between the ledger store and the persistence backend.
//!
//! [`Store`] exposes the plain single-statement reads and writes plus
//! [`Store::begin`], which opens a [`LedgerTx`]. Everything done through a
//! `LedgerTx` becomes visible at [`LedgerTx::commit`] or not at all; dropping
//! an uncommitted handle rolls it back.

use crate::error::LedgerError;
use crate::models::{
    Account, CreateAccount, CreateUser, Entry, ListEntriesParams, ListTransfersParams, Page,
    Transfer, User,
};
use async_trait::async_trait;

/// An open transaction. Row locks taken through it are held until it ends.
#[async_trait]
pub trait LedgerTx: Send {
    /// Read an account and lock its row for the rest of the transaction.
    async fn get_account_for_update(&mut self, id: i64) -> Result<Account, LedgerError>;

    /// Atomically add `delta` to the account balance, returning the new row.
    async fn add_account_balance(&mut self, id: i64, delta: i64) -> Result<Account, LedgerError>;

    async fn create_transfer(
        &mut self,
        from_account_id: i64,
        to_account_id: i64,
        amount: i64,
    ) -> Result<Transfer, LedgerError>;

    async fn create_entry(&mut self, account_id: i64, amount: i64) -> Result<Entry, LedgerError>;

    async fn commit(self) -> Result<(), LedgerError>;

    async fn rollback(self) -> Result<(), LedgerError>;
}

#[async_trait]
pub trait Store: Send + Sync {
    type Tx: LedgerTx;

    async fn begin(&self) -> Result<Self::Tx, LedgerError>;

    async fn create_user(&self, input: &CreateUser) -> Result<User, LedgerError>;

    async fn get_user(&self, username: &str) -> Result<User, LedgerError>;

    async fn create_account(&self, input: &CreateAccount) -> Result<Account, LedgerError>;

    async fn get_account(&self, id: i64) -> Result<Account, LedgerError>;

    async fn list_accounts(&self, owner: &str, page: Page) -> Result<Vec<Account>, LedgerError>;

    async fn get_entry(&self, id: i64) -> Result<Entry, LedgerError>;

    async fn list_entries(&self, params: &ListEntriesParams) -> Result<Vec<Entry>, LedgerError>;

    async fn get_transfer(&self, id: i64) -> Result<Transfer, LedgerError>;

    async fn list_transfers(
        &self,
        params: &ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError>;
}
