//! In-process implementation of the store seam.
//!
//! Reproduces the transactional model of the PostgreSQL store: each account
//! row has its own async lock which a [`MemoryTx`] holds until it commits or
//! is dropped, writes are staged inside the transaction and only published at
//! commit, and balance changes are recorded as deltas against the committed
//! value. Readers outside a transaction only ever see committed rows.
//!
//! Ids come from sequences that are not rolled back, like `BIGSERIAL`.

use crate::error::LedgerError;
use crate::models::{
    Account, CreateAccount, CreateUser, Entry, ListEntriesParams, ListTransfersParams, Page,
    Transfer, User,
};
use crate::services::store::{LedgerTx, Store};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tracing::debug;

#[derive(Default)]
struct Tables {
    users: BTreeMap<String, User>,
    accounts: BTreeMap<i64, Account>,
    entries: BTreeMap<i64, Entry>,
    transfers: BTreeMap<i64, Transfer>,
}

#[derive(Default)]
struct Inner {
    /// Committed state. Never held across an await.
    tables: Mutex<Tables>,
    row_locks: DashMap<i64, Arc<RowLock<()>>>,
    account_seq: AtomicI64,
    entry_seq: AtomicI64,
    transfer_seq: AtomicI64,
    failing_commits: AtomicUsize,
}

impl Inner {
    fn account_exists(&self, id: i64) -> bool {
        self.tables.lock().accounts.contains_key(&id)
    }

    fn committed_account(&self, id: i64) -> Result<Account, LedgerError> {
        self.tables
            .lock()
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| account_not_found(id))
    }

    fn row_lock(&self, id: i64) -> Arc<RowLock<()>> {
        self.row_locks.entry(id).or_default().clone()
    }
}

fn next_id(seq: &AtomicI64) -> i64 {
    seq.fetch_add(1, Ordering::SeqCst) + 1
}

/// `0001-01-01T00:00:00Z`, the column default for a password never changed.
fn password_never_changed() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn account_not_found(id: i64) -> LedgerError {
    LedgerError::NotFound(anyhow::anyhow!("account {} does not exist", id))
}

/// Shared, cloneable in-memory ledger.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` commits fail with [`LedgerError::Transaction`],
    /// discarding everything the failing transactions staged.
    pub fn fail_next_commits(&self, count: usize) {
        self.inner.failing_commits.store(count, Ordering::SeqCst);
    }

    fn take_commit_failure(&self) -> bool {
        self.inner
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// A transaction against a [`MemoryStore`].
pub struct MemoryTx {
    store: MemoryStore,
    held: HashMap<i64, OwnedMutexGuard<()>>,
    balance_deltas: HashMap<i64, i64>,
    transfers: Vec<Transfer>,
    entries: Vec<Entry>,
}

impl MemoryTx {
    async fn lock_row(&mut self, id: i64) -> Result<(), LedgerError> {
        if self.held.contains_key(&id) {
            return Ok(());
        }
        // Accounts are never deleted, so existence checked before waiting holds after.
        if !self.store.inner.account_exists(id) {
            return Err(account_not_found(id));
        }
        let row = self.store.inner.row_lock(id);
        let guard = row.lock_owned().await;
        self.held.insert(id, guard);
        Ok(())
    }

    fn staged_account(&self, id: i64) -> Result<Account, LedgerError> {
        let mut account = self.store.inner.committed_account(id)?;
        let delta = self.balance_deltas.get(&id).copied().unwrap_or_default();
        account.balance = account.balance.checked_add(delta).ok_or_else(|| {
            LedgerError::Internal(anyhow::anyhow!("balance of account {} out of range", id))
        })?;
        Ok(account)
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn get_account_for_update(&mut self, id: i64) -> Result<Account, LedgerError> {
        self.lock_row(id).await?;
        self.staged_account(id)
    }

    async fn add_account_balance(&mut self, id: i64, delta: i64) -> Result<Account, LedgerError> {
        // An UPDATE takes the row lock too.
        self.lock_row(id).await?;
        let staged = self.balance_deltas.entry(id).or_default();
        *staged = staged.checked_add(delta).ok_or_else(|| {
            LedgerError::Internal(anyhow::anyhow!("balance delta of account {} out of range", id))
        })?;
        self.staged_account(id)
    }

    async fn create_transfer(
        &mut self,
        from_account_id: i64,
        to_account_id: i64,
        amount: i64,
    ) -> Result<Transfer, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidArgument(anyhow::anyhow!(
                "transfer amount must be positive, got {}",
                amount
            )));
        }
        for id in [from_account_id, to_account_id] {
            if !self.store.inner.account_exists(id) {
                return Err(account_not_found(id));
            }
        }

        let transfer = Transfer {
            id: next_id(&self.store.inner.transfer_seq),
            from_account_id,
            to_account_id,
            amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn create_entry(&mut self, account_id: i64, amount: i64) -> Result<Entry, LedgerError> {
        if !self.store.inner.account_exists(account_id) {
            return Err(account_not_found(account_id));
        }

        let entry = Entry {
            id: next_id(&self.store.inner.entry_seq),
            account_id,
            amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    async fn commit(self) -> Result<(), LedgerError> {
        if self.store.take_commit_failure() {
            debug!(
                staged_transfers = self.transfers.len(),
                "Discarding transaction on injected commit failure"
            );
            return Err(LedgerError::Transaction(anyhow::anyhow!(
                "commit failed: injected failure"
            )));
        }

        let MemoryTx {
            store,
            held,
            balance_deltas,
            transfers,
            entries,
        } = self;

        {
            let mut tables = store.inner.tables.lock();
            for (id, delta) in balance_deltas {
                let account = tables
                    .accounts
                    .get_mut(&id)
                    .ok_or_else(|| account_not_found(id))?;
                account.balance += delta;
            }
            for transfer in transfers {
                tables.transfers.insert(transfer.id, transfer);
            }
            for entry in entries {
                tables.entries.insert(entry.id, entry);
            }
        }

        // Row locks are released only once the writes are visible.
        drop(held);
        Ok(())
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, LedgerError> {
        Ok(MemoryTx {
            store: self.clone(),
            held: HashMap::new(),
            balance_deltas: HashMap::new(),
            transfers: Vec::new(),
            entries: Vec::new(),
        })
    }

    async fn create_user(&self, input: &CreateUser) -> Result<User, LedgerError> {
        let mut tables = self.inner.tables.lock();
        if tables.users.contains_key(&input.username)
            || tables.users.values().any(|u| u.email == input.email)
        {
            return Err(LedgerError::Conflict(anyhow::anyhow!(
                "user '{}' or email '{}' already registered",
                input.username,
                input.email
            )));
        }

        let now = Utc::now();
        let user = User {
            username: input.username.clone(),
            hashed_password: input.hashed_password.clone(),
            full_name: input.full_name.clone(),
            email: input.email.clone(),
            password_changed_at: password_never_changed(),
            created_at: now,
        };
        tables.users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, username: &str) -> Result<User, LedgerError> {
        self.inner
            .tables
            .lock()
            .users
            .get(username)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(anyhow::anyhow!("user '{}' does not exist", username)))
    }

    async fn create_account(&self, input: &CreateAccount) -> Result<Account, LedgerError> {
        let mut tables = self.inner.tables.lock();
        if !tables.users.contains_key(&input.owner) {
            return Err(LedgerError::NotFound(anyhow::anyhow!(
                "owner '{}' does not exist",
                input.owner
            )));
        }
        let currency = input.currency.as_str();
        if tables
            .accounts
            .values()
            .any(|a| a.owner == input.owner && a.currency == currency)
        {
            return Err(LedgerError::Conflict(anyhow::anyhow!(
                "'{}' already has a {} account",
                input.owner,
                currency
            )));
        }

        let account = Account {
            id: next_id(&self.inner.account_seq),
            owner: input.owner.clone(),
            balance: input.balance,
            currency: currency.to_string(),
            created_at: Utc::now(),
        };
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, id: i64) -> Result<Account, LedgerError> {
        self.inner.committed_account(id)
    }

    async fn list_accounts(&self, owner: &str, page: Page) -> Result<Vec<Account>, LedgerError> {
        let tables = self.inner.tables.lock();
        let matching: Vec<&Account> = tables.accounts.values().filter(|a| a.owner == owner).collect();
        Ok(matching[page.window(matching.len())]
            .iter()
            .map(|a| (*a).clone())
            .collect())
    }

    async fn get_entry(&self, id: i64) -> Result<Entry, LedgerError> {
        self.inner
            .tables
            .lock()
            .entries
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(anyhow::anyhow!("entry {} does not exist", id)))
    }

    async fn list_entries(&self, params: &ListEntriesParams) -> Result<Vec<Entry>, LedgerError> {
        let tables = self.inner.tables.lock();
        let matching: Vec<&Entry> = tables
            .entries
            .values()
            .filter(|e| params.account_id.map_or(true, |id| e.account_id == id))
            .collect();
        Ok(matching[params.page.window(matching.len())]
            .iter()
            .map(|e| (*e).clone())
            .collect())
    }

    async fn get_transfer(&self, id: i64) -> Result<Transfer, LedgerError> {
        self.inner
            .tables
            .lock()
            .transfers
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(anyhow::anyhow!("transfer {} does not exist", id)))
    }

    async fn list_transfers(
        &self,
        params: &ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        let tables = self.inner.tables.lock();
        let matching: Vec<&Transfer> = tables
            .transfers
            .values()
            .filter(|t| params.matches(t))
            .collect();
        Ok(matching[params.page.window(matching.len())]
            .iter()
            .map(|t| (*t).clone())
            .collect())
    }
}
