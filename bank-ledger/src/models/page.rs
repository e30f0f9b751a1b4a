//! Limit/offset pagination.

use crate::error::LedgerError;
use serde::{Deserialize, Serialize};

/// Largest page any list query returns.
pub const MAX_PAGE_SIZE: i64 = 100;

const DEFAULT_PAGE_SIZE: i64 = 10;

/// A validated `LIMIT`/`OFFSET` pair. Deserializing goes through
/// [`Page::new`], so an out-of-range page is rejected there too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPage")]
pub struct Page {
    limit: i64,
    offset: i64,
}

#[derive(Deserialize)]
struct RawPage {
    limit: i64,
    #[serde(default)]
    offset: i64,
}

impl TryFrom<RawPage> for Page {
    type Error = LedgerError;

    fn try_from(raw: RawPage) -> Result<Self, Self::Error> {
        Page::new(raw.limit, raw.offset)
    }
}

impl Page {
    /// `limit` must be in `1..=MAX_PAGE_SIZE` and `offset` non-negative.
    pub fn new(limit: i64, offset: i64) -> Result<Self, LedgerError> {
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(LedgerError::InvalidArgument(anyhow::anyhow!(
                "limit must be between 1 and {}, got {}",
                MAX_PAGE_SIZE,
                limit
            )));
        }
        if offset < 0 {
            return Err(LedgerError::InvalidArgument(anyhow::anyhow!(
                "offset must not be negative, got {}",
                offset
            )));
        }
        Ok(Self { limit, offset })
    }

    /// Convert a 1-based page number and page size into limit/offset.
    pub fn from_page(page_id: i64, page_size: i64) -> Result<Self, LedgerError> {
        if page_id < 1 {
            return Err(LedgerError::InvalidArgument(anyhow::anyhow!(
                "page_id must be at least 1, got {}",
                page_id
            )));
        }
        let offset = (page_id - 1).checked_mul(page_size).ok_or_else(|| {
            LedgerError::InvalidArgument(anyhow::anyhow!("page_id {} is out of range", page_id))
        })?;
        Self::new(page_size, offset)
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Clamp an index range over an in-memory sequence of `len` rows.
    pub(crate) fn window(&self, len: usize) -> std::ops::Range<usize> {
        let start = usize::try_from(self.offset).unwrap_or(usize::MAX).min(len);
        let end = start
            .saturating_add(usize::try_from(self.limit).unwrap_or(usize::MAX))
            .min(len);
        start..end
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}
