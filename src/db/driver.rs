//! Driver adapter seam.
//!
//! The lifecycle manager never talks to a wire protocol directly. It opens
//! connections through a [`Driver`] and runs statements on the resulting
//! [`DriverConnection`]. [`MySqlDriver`](super::mysql::MySqlDriver) is the
//! production implementation; tests plug in scripted drivers.

use crate::error::DriverError;
use crate::models::{ConnectionConfig, QueryOutput, QueryParam};
use std::future::Future;

/// Opens connections.
pub trait Driver: Send + Sync + 'static {
    type Connection: DriverConnection;

    /// Open a new connection.
    fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = Result<Self::Connection, DriverError>> + Send;
}

/// One live driver connection.
pub trait DriverConnection: Send + 'static {
    /// Server side session id, if known.
    fn session_id(&self) -> Option<u64> {
        None
    }

    /// True while the transport is still handshaking.
    fn is_connecting(&self) -> bool {
        false
    }

    /// Re-issue a connect on an existing handle. Must be idempotent.
    fn reconnect(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send;

    /// Substitute `params` into the `?` placeholders of `sql`.
    fn format(&self, sql: &str, params: &[QueryParam]) -> Result<String, DriverError>;

    /// Execute an already formatted query text.
    fn execute(&mut self, sql: &str)
    -> impl Future<Output = Result<QueryOutput, DriverError>> + Send;

    /// Errors the connection raised asynchronously since the last call.
    fn take_runtime_errors(&mut self) -> Vec<DriverError> {
        Vec::new()
    }

    /// Close gracefully.
    fn end(self) -> impl Future<Output = Result<(), DriverError>> + Send;

    /// Tear down immediately.
    fn destroy(self);
}
