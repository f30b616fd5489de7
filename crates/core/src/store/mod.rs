//! SQLite-backed partition store.
//!
//! Each shard is one SQLite database accessed through tokio-rusqlite. This
//! module provides:
//!
//! - Connection setup with WAL pragmas
//! - A per-partition migration ledger
//! - The plain [`LinkRepository`](crate::repository::LinkRepository) over one partition

pub mod connection;
pub mod links;
pub mod migrations;

pub use connection::PartitionStore;
