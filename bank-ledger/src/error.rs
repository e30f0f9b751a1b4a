//! Error kinds produced by the repository and the ledger store.
//!
//! Driver errors are classified once, in `From<sqlx::Error>`; everything above
//! the repository matches on [`LedgerError`] variants only.

use service_core::error::AppError;
use thiserror::Error;

/// SQLSTATE codes after which the whole transaction can simply be retried.
const RETRYABLE_SQLSTATES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
    "57014", // query_canceled (statement/lock timeout)
];

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    /// The unit of work could not complete and was rolled back. Safe to retry.
    #[error("Transaction error: {0}")]
    Transaction(anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(anyhow::Error),
}

impl LedgerError {
    /// Whether the caller may retry the whole operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Transaction(_))
    }

    /// Stable snake_case label, used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::InvalidArgument(_) => "invalid_argument",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::Transaction(_) => "transaction_error",
            LedgerError::Internal(_) => "internal",
        }
    }
}

fn classify(err: &sqlx::Error) -> fn(anyhow::Error) -> LedgerError {
    match err {
        sqlx::Error::RowNotFound => LedgerError::NotFound,
        sqlx::Error::Database(db_err) => {
            if db_err.is_unique_violation() {
                LedgerError::Conflict
            } else if db_err.is_foreign_key_violation() {
                LedgerError::NotFound
            } else if db_err.is_check_violation() {
                LedgerError::InvalidArgument
            } else if db_err.code().is_some_and(|code| {
                RETRYABLE_SQLSTATES.contains(&code.as_ref()) || code.starts_with("08")
            }) {
                LedgerError::Transaction
            } else {
                LedgerError::Internal
            }
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => LedgerError::Transaction,
        _ => LedgerError::Internal,
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        let wrap = classify(&err);
        wrap(anyhow::Error::new(err))
    }
}

impl LedgerError {
    /// Classify a driver error, prefixing it with what was being attempted.
    pub(crate) fn database(action: &'static str) -> impl FnOnce(sqlx::Error) -> LedgerError {
        move |err| {
            let wrap = classify(&err);
            wrap(anyhow::anyhow!("Failed to {}: {}", action, err))
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidArgument(e) => AppError::BadRequest(e),
            LedgerError::NotFound(e) => AppError::NotFound(e),
            LedgerError::Conflict(e) => AppError::Conflict(e),
            LedgerError::Transaction(e) => AppError::DatabaseError(e),
            LedgerError::Internal(e) => AppError::InternalError(e),
        }
    }
}
