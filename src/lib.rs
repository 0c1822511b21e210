//! mysql-keeper library
//!
//! A resilience layer over a single MySQL connection: lazy connect with
//! bounded retries, transparent recovery from dropped connections, zombie
//! session reaping and ordered transactions with rollback handlers.

pub mod config;
pub mod db;
pub mod error;
pub mod hooks;
pub mod models;

pub use config::{Config, RuntimeConfig, RuntimeOptions};
pub use db::{Database, Transaction};
pub use error::{DbError, DbResult};
pub use hooks::LifecycleHooks;
pub use models::{ConnectionConfig, QueryOutput, QueryParam};
