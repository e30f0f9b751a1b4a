//! Transfer model and the parameters/result of a funds transfer.

use super::{Account, Entry, Page};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Immutable record of one money movement between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Transfer {
    pub id: i64,
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Request to move `amount` minor units from one account to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferParams {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: i64,
}

impl TransferParams {
    pub fn new(from_account_id: i64, to_account_id: i64, amount: i64) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
        }
    }

    /// Shape checks that need no database access.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount <= 0 {
            return Err(LedgerError::InvalidArgument(anyhow::anyhow!(
                "transfer amount must be positive, got {}",
                self.amount
            )));
        }
        if self.from_account_id == self.to_account_id {
            return Err(LedgerError::InvalidArgument(anyhow::anyhow!(
                "cannot transfer from account {} to itself",
                self.from_account_id
            )));
        }
        Ok(())
    }

    /// Account ids in the order their row locks must be taken: ascending,
    /// whatever the direction of the transfer.
    pub fn lock_order(&self) -> [i64; 2] {
        if self.from_account_id < self.to_account_id {
            [self.from_account_id, self.to_account_id]
        } else {
            [self.to_account_id, self.from_account_id]
        }
    }
}

/// Everything a committed transfer wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

/// Filter for listing transfers. Either side may be left open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListTransfersParams {
    pub from_account_id: Option<i64>,
    pub to_account_id: Option<i64>,
    pub page: Page,
}

impl ListTransfersParams {
    pub fn matches(&self, transfer: &Transfer) -> bool {
        self.from_account_id
            .map_or(true, |id| transfer.from_account_id == id)
            && self.to_account_id.map_or(true, |id| transfer.to_account_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_amounts_are_invalid() {
        assert!(matches!(
            TransferParams::new(1, 2, 0).validate(),
            Err(LedgerError::InvalidArgument(_))
        ));
        assert!(matches!(
            TransferParams::new(1, 2, -5).validate(),
            Err(LedgerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn self_transfer_is_invalid() {
        let err = TransferParams::new(4, 4, 10).validate().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidArgument(_)));
        assert!(err.to_string().contains("to itself"));
    }

    #[test]
    fn lock_order_ignores_direction() {
        assert_eq!(TransferParams::new(3, 9, 1).lock_order(), [3, 9]);
        assert_eq!(TransferParams::new(9, 3, 1).lock_order(), [3, 9]);
    }

    #[test]
    fn open_filters_match_everything() {
        let transfer = Transfer {
            id: 1,
            from_account_id: 10,
            to_account_id: 20,
            amount: 5,
            created_at: Utc::now(),
        };

        assert!(ListTransfersParams::default().matches(&transfer));
        let from_only = ListTransfersParams {
            from_account_id: Some(10),
            ..Default::default()
        };
        assert!(from_only.matches(&transfer));
        let wrong_to = ListTransfersParams {
            from_account_id: Some(10),
            to_account_id: Some(10),
            ..Default::default()
        };
        assert!(!wrong_to.matches(&transfer));
    }
}
