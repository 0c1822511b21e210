//! Database access layer.
//!
//! This module provides:
//! - The driver adapter seam and its sqlx MySQL implementation
//! - Connection lifecycle management with bounded connect retries
//! - Query execution with protocol error recovery
//! - Zombie session reaping
//! - Ordered multi-statement transactions
//! - Database/table convenience helpers

pub mod driver;
pub mod executor;
pub mod lifecycle;
pub mod mysql;
pub mod params;
pub mod reaper;
pub mod schema;
pub mod transaction;
pub mod types;

pub use driver::{Driver, DriverConnection};
pub use executor::RollbackHandler;
pub use lifecycle::Database;
pub use mysql::{MySqlDriver, MySqlDriverConnection};
pub use params::{escape_identifier, escape_qualified_identifier, format_query};
pub use reaper::reap_timeout;
pub use transaction::{Transaction, TransactionState};
