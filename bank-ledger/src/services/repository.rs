//! Row-level queries against the ledger schema.
//!
//! Every function is a single statement and is generic over the executor, so
//! the same query runs against the pool or inside an open transaction
//! (`&mut *tx`). None of them retry or take locks beyond what the statement
//! itself implies.

use crate::error::LedgerError;
use crate::models::{
    Account, CreateAccount, CreateUser, Entry, ListEntriesParams, ListTransfersParams, Page,
    Transfer, User,
};
use crate::services::metrics::DB_QUERY_DURATION;
use sqlx::postgres::PgExecutor;
use tracing::{debug, instrument};

const ACCOUNT_COLUMNS: &str = "id, owner, balance, currency, created_at";

// -------------------------------------------------------------------------
// Users
// -------------------------------------------------------------------------

#[instrument(skip(executor, input), fields(username = %input.username))]
pub async fn create_user<'e, E>(executor: E, input: &CreateUser) -> Result<User, LedgerError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["create_user"])
        .start_timer();

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, hashed_password, full_name, email)
        VALUES ($1, $2, $3, $4)
        RETURNING username, hashed_password, full_name, email, password_changed_at, created_at
        "#,
    )
    .bind(&input.username)
    .bind(&input.hashed_password)
    .bind(&input.full_name)
    .bind(&input.email)
    .fetch_one(executor)
    .await
    .map_err(LedgerError::database("create user"))?;

    timer.observe_duration();

    Ok(user)
}

#[instrument(skip(executor))]
pub async fn get_user<'e, E>(executor: E, username: &str) -> Result<User, LedgerError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["get_user"])
        .start_timer();

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT username, hashed_password, full_name, email, password_changed_at, created_at
        FROM users
        WHERE username = $1
        "#,
    )
    .bind(username)
    .fetch_optional(executor)
    .await
    .map_err(LedgerError::database("get user"))?;

    timer.observe_duration();

    user.ok_or_else(|| LedgerError::NotFound(anyhow::anyhow!("user '{}' does not exist", username)))
}

// -------------------------------------------------------------------------
// Accounts
// -------------------------------------------------------------------------

#[instrument(skip(executor, input), fields(owner = %input.owner, currency = %input.currency))]
pub async fn create_account<'e, E>(
    executor: E,
    input: &CreateAccount,
) -> Result<Account, LedgerError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["create_account"])
        .start_timer();

    let account = sqlx::query_as::<_, Account>(&format!(
        r#"
        INSERT INTO accounts (owner, balance, currency)
        VALUES ($1, $2, $3)
        RETURNING {ACCOUNT_COLUMNS}
        "#
    ))
    .bind(&input.owner)
    .bind(input.balance)
    .bind(input.currency.as_str())
    .fetch_one(executor)
    .await
    .map_err(LedgerError::database("create account"))?;

    timer.observe_duration();

    debug!(account_id = account.id, "Account created");

    Ok(account)
}

#[instrument(skip(executor))]
pub async fn get_account<'e, E>(executor: E, id: i64) -> Result<Account, LedgerError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["get_account"])
        .start_timer();

    let account = sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
    .map_err(LedgerError::database("get account"))?;

    timer.observe_duration();

    account.ok_or_else(|| account_not_found(id))
}

/// Read an account and hold its row lock until the enclosing transaction ends.
///
/// `FOR NO KEY UPDATE` rather than `FOR UPDATE`: inserting a transfer or entry
/// takes a `KEY SHARE` lock on the referenced account row, which `FOR UPDATE`
/// would conflict with.
#[instrument(skip(executor))]
pub async fn get_account_for_update<'e, E>(executor: E, id: i64) -> Result<Account, LedgerError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["get_account_for_update"])
        .start_timer();

    let account = sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 LIMIT 1 FOR NO KEY UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
    .map_err(LedgerError::database("lock account"))?;

    timer.observe_duration();

    account.ok_or_else(|| account_not_found(id))
}

#[instrument(skip(executor))]
pub async fn list_accounts<'e, E>(
    executor: E,
    owner: &str,
    page: Page,
) -> Result<Vec<Account>, LedgerError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["list_accounts"])
        .start_timer();

    let accounts = sqlx::query_as::<_, Account>(&format!(
        r#"
        SELECT {ACCOUNT_COLUMNS}
        FROM accounts
        WHERE owner = $1
        ORDER BY id
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(owner)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(executor)
    .await
    .map_err(LedgerError::database("list accounts"))?;

    timer.observe_duration();

    Ok(accounts)
}

/// Add `delta` to the stored balance in one statement and return the new row.
#[instrument(skip(executor))]
pub async fn add_account_balance<'e, E>(
    executor: E,
    id: i64,
    delta: i64,
) -> Result<Account, LedgerError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["add_account_balance"])
        .start_timer();

    let account = sqlx::query_as::<_, Account>(&format!(
        r#"
        UPDATE accounts
        SET balance = balance + $2
        WHERE id = $1
        RETURNING {ACCOUNT_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(delta)
    .fetch_optional(executor)
    .await
    .map_err(LedgerError::database("update account balance"))?;

    timer.observe_duration();

    account.ok_or_else(|| account_not_found(id))
}

// -------------------------------------------------------------------------
// Entries
// -------------------------------------------------------------------------

#[instrument(skip(executor))]
pub async fn create_entry<'e, E>(
    executor: E,
    account_id: i64,
    amount: i64,
) -> Result<Entry, LedgerError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["create_entry"])
        .start_timer();

    let entry = sqlx::query_as::<_, Entry>(
        r#"
        INSERT INTO entries (account_id, amount)
        VALUES ($1, $2)
        RETURNING id, account_id, amount, created_at
        "#,
    )
    .bind(account_id)
    .bind(amount)
    .fetch_one(executor)
    .await
    .map_err(LedgerError::database("create entry"))?;

    timer.observe_duration();

    Ok(entry)
}

#[instrument(skip(executor))]
pub async fn get_entry<'e, E>(executor: E, id: i64) -> Result<Entry, LedgerError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["get_entry"])
        .start_timer();

    let entry = sqlx::query_as::<_, Entry>(
        "SELECT id, account_id, amount, created_at FROM entries WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
    .map_err(LedgerError::database("get entry"))?;

    timer.observe_duration();

    entry.ok_or_else(|| LedgerError::NotFound(anyhow::anyhow!("entry {} does not exist", id)))
}

#[instrument(skip(executor))]
pub async fn list_entries<'e, E>(
    executor: E,
    params: &ListEntriesParams,
) -> Result<Vec<Entry>, LedgerError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["list_entries"])
        .start_timer();

    let entries = sqlx::query_as::<_, Entry>(
        r#"
        SELECT id, account_id, amount, created_at
        FROM entries
        WHERE ($1::bigint IS NULL OR account_id = $1)
        ORDER BY id
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(params.account_id)
    .bind(params.page.limit())
    .bind(params.page.offset())
    .fetch_all(executor)
    .await
    .map_err(LedgerError::database("list entries"))?;

    timer.observe_duration();

    Ok(entries)
}

// -------------------------------------------------------------------------
// Transfers
// -------------------------------------------------------------------------

#[instrument(skip(executor))]
pub async fn create_transfer<'e, E>(
    executor: E,
    from_account_id: i64,
    to_account_id: i64,
    amount: i64,
) -> Result<Transfer, LedgerError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["create_transfer"])
        .start_timer();

    let transfer = sqlx::query_as::<_, Transfer>(
        r#"
        INSERT INTO transfers (from_account_id, to_account_id, amount)
        VALUES ($1, $2, $3)
        RETURNING id, from_account_id, to_account_id, amount, created_at
        "#,
    )
    .bind(from_account_id)
    .bind(to_account_id)
    .bind(amount)
    .fetch_one(executor)
    .await
    .map_err(LedgerError::database("create transfer"))?;

    timer.observe_duration();

    Ok(transfer)
}

#[instrument(skip(executor))]
pub async fn get_transfer<'e, E>(executor: E, id: i64) -> Result<Transfer, LedgerError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["get_transfer"])
        .start_timer();

    let transfer = sqlx::query_as::<_, Transfer>(
        r#"
        SELECT id, from_account_id, to_account_id, amount, created_at
        FROM transfers
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
    .map_err(LedgerError::database("get transfer"))?;

    timer.observe_duration();

    transfer.ok_or_else(|| LedgerError::NotFound(anyhow::anyhow!("transfer {} does not exist", id)))
}

/// List transfers ordered by id. A `None` filter matches any account.
#[instrument(skip(executor))]
pub async fn list_transfers<'e, E>(
    executor: E,
    params: &ListTransfersParams,
) -> Result<Vec<Transfer>, LedgerError>
where
    E: PgExecutor<'e>,
{
    let timer = DB_QUERY_DURATION
        .with_label_values(&["list_transfers"])
        .start_timer();

    let transfers = sqlx::query_as::<_, Transfer>(
        r#"
        SELECT id, from_account_id, to_account_id, amount, created_at
        FROM transfers
        WHERE ($1::bigint IS NULL OR from_account_id = $1)
          AND ($2::bigint IS NULL OR to_account_id = $2)
        ORDER BY id
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(params.from_account_id)
    .bind(params.to_account_id)
    .bind(params.page.limit())
    .bind(params.page.offset())
    .fetch_all(executor)
    .await
    .map_err(LedgerError::database("list transfers"))?;

    timer.observe_duration();

    Ok(transfers)
}

fn account_not_found(id: i64) -> LedgerError {
    LedgerError::NotFound(anyhow::anyhow!("account {} does not exist", id))
}
