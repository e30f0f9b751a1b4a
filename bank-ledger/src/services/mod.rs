//! Services module for bank-ledger.

pub mod database;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod postgres;
pub mod repository;
pub mod store;

pub use database::Database;
pub use ledger::LedgerStore;
pub use memory::{MemoryStore, MemoryTx};
pub use metrics::{get_metrics, init_metrics};
pub use postgres::{PgStore, PgTx};
pub use store::{LedgerTx, Store};
