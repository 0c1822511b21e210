//! Data models for mysql-keeper.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod server;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionConfigError, SessionInfo};
pub use query::{QueryOutput, QueryParam, QueuedStatement, Row};
pub use server::{MaxConnectionsSnapshot, UsedConnectionsSnapshot, ZombieSession, refresh_due};
