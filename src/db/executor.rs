//! Query execution with failure classification.
//!
//! Every statement goes through [`Database::connect`] first. Driver failures
//! are then handled by class:
//!
//! | class | handling |
//! |---|---|
//! | fatal protocol | destroy the connection, return the error |
//! | recoverable protocol | drop the connection, run the statement once more on a fresh one |
//! | anything else | optional `ROLLBACK` plus rollback handler, return the error |

use crate::db::driver::{Driver, DriverConnection};
use crate::db::lifecycle::{Database, SessionState};
use crate::error::{DbError, DbResult};
use crate::models::{QueryOutput, QueryParam};
use tracing::{debug, error, info, warn};

/// Called with the failing statement's error after `ROLLBACK` was issued.
pub type RollbackHandler = Box<dyn FnMut(&DbError) + Send>;

/// Statements run for one caller request: the original plus one retry.
const MAX_ATTEMPTS: u32 = 2;

impl<D: Driver> Database<D> {
    /// Run `sql` with `params` bound to its `?` placeholders.
    ///
    /// Returns an empty [`QueryOutput`] when no connection could be opened
    /// and `on_connect_error` chose to swallow the failure.
    pub async fn query(&self, sql: &str, params: &[QueryParam]) -> DbResult<QueryOutput> {
        let mut state = self.state.lock().await;
        self.query_locked(&mut state, sql, params, None).await
    }

    /// Like [`query`](Self::query), but a failing statement first issues
    /// `ROLLBACK` and then calls `rollback` with the error. The error is still
    /// returned.
    pub async fn query_with_rollback<F>(
        &self,
        sql: &str,
        params: &[QueryParam],
        mut rollback: F,
    ) -> DbResult<QueryOutput>
    where
        F: FnMut(&DbError) + Send,
    {
        let mut state = self.state.lock().await;
        self.query_locked(&mut state, sql, params, Some(&mut rollback)).await
    }

    pub(crate) async fn query_locked(
        &self,
        state: &mut SessionState<D::Connection>,
        sql: &str,
        params: &[QueryParam],
        rollback: Option<&mut (dyn FnMut(&DbError) + Send)>,
    ) -> DbResult<QueryOutput> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.connect_locked(state).await?;

            let Some(conn) = state.connection.as_mut() else {
                debug!(sql, "No connection available, returning empty result");
                return Ok(QueryOutput::default());
            };

            let formatted = match conn.format(sql, params) {
                Ok(formatted) => formatted,
                Err(e) => {
                    debug!(error = %e, sql, "Query could not be formatted");
                    let err = DbError::invalid_input(e.message);
                    if let Some(handler) = rollback {
                        self.rollback_locked(state).await;
                        handler(&err);
                    }
                    return Err(err);
                }
            };
            debug!(sql = %formatted, attempt, "Executing query");

            let err = match conn.execute(&formatted).await {
                Ok(output) => {
                    if self.config.debug {
                        let result = serde_json::to_string(&output).unwrap_or_default();
                        info!(sql = %formatted, result = %result, "Query executed");
                    }
                    return Ok(output);
                }
                Err(e) => e,
            };

            if err.code.is_fatal_protocol() {
                self.record_error();
                state.discard();
                error!(error = %err, sql = %formatted, "Fatal protocol error, connection destroyed");
                return Err(DbError::FatalProtocol(err));
            }

            if err.code.is_recoverable_protocol() {
                self.record_error();
                state.discard();
                if attempt >= MAX_ATTEMPTS {
                    warn!(error = %err, sql = %formatted, "Connection lost again on retry");
                    return Err(DbError::ConnectionLost(err));
                }
                warn!(error = %err, "Connection lost, retrying query on a new connection");
                continue;
            }

            debug!(error = %err, sql = %formatted, "Query failed");
            let err = DbError::Query(err);
            if let Some(handler) = rollback {
                self.rollback_locked(state).await;
                handler(&err);
            }
            return Err(err);
        }
    }

    /// Best-effort `ROLLBACK` on the current connection. A failure is logged
    /// and never replaces the error that triggered it.
    async fn rollback_locked(&self, state: &mut SessionState<D::Connection>) {
        let Some(conn) = state.connection.as_mut() else {
            warn!("No connection to roll back");
            return;
        };

        if let Err(e) = conn.execute("ROLLBACK").await {
            warn!(error = %e, "ROLLBACK failed");
            if e.code.is_fatal_protocol() || e.code.is_recoverable_protocol() {
                self.record_error();
                state.discard();
            }
        }
    }
}
