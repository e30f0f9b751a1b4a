//! Bank Ledger - accounts, entries and atomic funds transfers on PostgreSQL.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod startup;
