//! The ledger store: atomic funds transfers on top of a [`Store`].
//!
//! A transfer is one transaction that locks both account rows, writes the
//! transfer record and its two entries, and moves the balances with atomic
//! deltas. Row locks are always taken in ascending account id order, so two
//! transfers over the same pair of accounts in opposite directions queue on
//! the same first lock instead of each holding the lock the other needs.
//!
//! Nothing here retries. A [`LedgerError::Transaction`] means the attempt was
//! rolled back in full and the caller may run it again; note that transfers
//! are not deduplicated, so a retry records a new transfer.

use crate::error::LedgerError;
use crate::models::{ListTransfersParams, Transfer, TransferParams, TransferResult};
use crate::services::metrics::{ERRORS_TOTAL, TRANSFERRED_AMOUNT_TOTAL, TRANSFERS_TOTAL};
use crate::services::store::{LedgerTx, Store};
use std::time::Duration;
use tracing::{info, instrument, warn};

pub struct LedgerStore<S> {
    store: S,
    transfer_timeout: Option<Duration>,
}

impl<S: Store> LedgerStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            transfer_timeout: None,
        }
    }

    /// Bound the part of each transfer before COMMIT, lock waits included. An
    /// attempt that runs past the deadline is rolled back and reported as
    /// [`LedgerError::Transaction`]; a commit already under way is awaited.
    pub fn with_transfer_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    /// The underlying store, for the plain CRUD reads and writes.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Move `params.amount` from one account to another as a single unit of
    /// work.
    ///
    /// Dropping the returned future before it resolves rolls the transaction
    /// back.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidArgument`] - non-positive amount or same account
    ///   on both sides; no transaction is opened.
    /// - [`LedgerError::NotFound`] - either account does not exist.
    /// - [`LedgerError::Transaction`] - begin/commit failed or the deadline
    ///   elapsed before commit; retryable.
    #[instrument(
        skip(self),
        fields(
            from_account_id = params.from_account_id,
            to_account_id = params.to_account_id,
            amount = params.amount
        )
    )]
    pub async fn transfer_money(
        &self,
        params: TransferParams,
    ) -> Result<TransferResult, LedgerError> {
        let result = self.run_transfer(params).await;

        match &result {
            Ok(outcome) => {
                TRANSFERS_TOTAL.with_label_values(&["ok"]).inc();
                TRANSFERRED_AMOUNT_TOTAL.inc_by(params.amount.unsigned_abs());
                info!(
                    transfer_id = outcome.transfer.id,
                    from_balance = outcome.from_account.balance,
                    to_balance = outcome.to_account.balance,
                    "Transfer committed"
                );
            }
            Err(e) => {
                TRANSFERS_TOTAL.with_label_values(&[e.kind()]).inc();
                ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
                warn!(error = %e, retryable = e.is_retryable(), "Transfer failed");
            }
        }

        result
    }

    async fn run_transfer(&self, params: TransferParams) -> Result<TransferResult, LedgerError> {
        params.validate()?;

        let (tx, outcome) = match self.transfer_timeout {
            None => self.prepare_transfer(params).await?,
            Some(limit) => tokio::time::timeout(limit, self.prepare_transfer(params))
                .await
                .map_err(|_| {
                    LedgerError::Transaction(anyhow::anyhow!(
                        "transfer did not complete within {:?} and was rolled back",
                        limit
                    ))
                })??,
        };

        // COMMIT runs outside the deadline; its outcome is always awaited.
        tx.commit().await.map_err(|e| match e {
            LedgerError::Transaction(_) => e,
            other => LedgerError::Transaction(anyhow::anyhow!("commit failed: {}", other)),
        })?;

        Ok(outcome)
    }

    /// Begin and perform every write of the transfer, leaving the
    /// transaction open for the caller to commit.
    async fn prepare_transfer(
        &self,
        params: TransferParams,
    ) -> Result<(S::Tx, TransferResult), LedgerError> {
        let mut tx = self.store.begin().await?;

        match apply_transfer(&mut tx, params).await {
            Ok(outcome) => Ok((tx, outcome)),
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback after failed transfer did not complete");
                }
                Err(e)
            }
        }
    }

    pub async fn get_transfer(&self, id: i64) -> Result<Transfer, LedgerError> {
        self.store.get_transfer(id).await
    }

    pub async fn list_transfers(
        &self,
        params: &ListTransfersParams,
    ) -> Result<Vec<Transfer>, LedgerError> {
        self.store.list_transfers(params).await
    }
}

async fn apply_transfer<T: LedgerTx>(
    tx: &mut T,
    params: TransferParams,
) -> Result<TransferResult, LedgerError> {
    let TransferParams {
        from_account_id,
        to_account_id,
        amount,
    } = params;

    let [first, second] = params.lock_order();
    tx.get_account_for_update(first).await?;
    tx.get_account_for_update(second).await?;

    let transfer = tx
        .create_transfer(from_account_id, to_account_id, amount)
        .await?;
    let from_entry = tx.create_entry(from_account_id, -amount).await?;
    let to_entry = tx.create_entry(to_account_id, amount).await?;

    let (from_account, to_account) = if from_account_id < to_account_id {
        let from_account = tx.add_account_balance(from_account_id, -amount).await?;
        let to_account = tx.add_account_balance(to_account_id, amount).await?;
        (from_account, to_account)
    } else {
        let to_account = tx.add_account_balance(to_account_id, amount).await?;
        let from_account = tx.add_account_balance(from_account_id, -amount).await?;
        (from_account, to_account)
    };

    Ok(TransferResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}
