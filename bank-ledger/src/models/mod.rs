//! Domain models for bank-ledger.

mod account;
mod entry;
mod page;
mod transfer;
mod user;

pub use account::{Account, CreateAccount, Currency, UnsupportedCurrency};
pub use entry::{Entry, ListEntriesParams};
pub use page::{Page, MAX_PAGE_SIZE};
pub use transfer::{ListTransfersParams, Transfer, TransferParams, TransferResult};
pub use user::{CreateUser, User};
