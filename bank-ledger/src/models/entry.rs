//! Ledger entry model.

use super::Page;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One signed line against an account. Transfers always produce a pair whose
/// amounts sum to zero.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub account_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    pub fn is_debit(&self) -> bool {
        self.amount < 0
    }
}

/// Filter for listing entries; `account_id: None` matches every account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListEntriesParams {
    pub account_id: Option<i64>,
    pub page: Page,
}

impl ListEntriesParams {
    pub fn for_account(account_id: i64, page: Page) -> Self {
        Self {
            account_id: Some(account_id),
            page,
        }
    }
}
