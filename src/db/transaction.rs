//! Ordered multi-statement transactions.
//!
//! A [`Transaction`] only queues statements. Nothing reaches the server until
//! [`Transaction::commit`], which sends `START TRANSACTION`, every queued
//! statement in order and finally `COMMIT`, all while holding the instance's
//! session lock so no other caller's statement lands inside the transaction.
//!
//! ```no_run
//! # use mysql_keeper::db::Database;
//! # use mysql_keeper::error::DbResult;
//! # async fn example(db: &Database) -> DbResult<()> {
//! db.connect().await?;
//! let mut tx = db.create_transaction();
//! tx.add_query("INSERT INTO orders (id) VALUES (?)", vec![1.into()])?
//!     .add_query("UPDATE stock SET qty = qty - 1 WHERE id = ?", vec![7.into()])?
//!     .set_rollback(|err| eprintln!("order rolled back: {err}"));
//! let results = tx.commit().await?;
//! # Ok(())
//! # }
//! ```

use crate::db::driver::Driver;
use crate::db::executor::RollbackHandler;
use crate::db::lifecycle::{Database, SessionState};
use crate::error::{DbError, DbResult};
use crate::models::{QueryOutput, QueryParam, QueuedStatement};
use std::fmt;
use tracing::{debug, warn};

/// Where a transaction is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Statements may still be added.
    Building,
    Committing,
    Committed,
    Failed,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Building => "building",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Statements queued for one atomic commit. Borrows the [`Database`] it
/// commits through.
pub struct Transaction<'a, D: Driver> {
    db: &'a Database<D>,
    statements: Vec<QueuedStatement>,
    rollback: RollbackHandler,
    state: TransactionState,
    results: Vec<QueryOutput>,
}

impl<D: Driver> Database<D> {
    /// Start building a transaction.
    pub fn create_transaction(&self) -> Transaction<'_, D> {
        Transaction::new(self)
    }
}

impl<'a, D: Driver> Transaction<'a, D> {
    pub fn new(db: &'a Database<D>) -> Self {
        Self {
            db,
            statements: Vec::new(),
            rollback: Box::new(|_| {}),
            state: TransactionState::Building,
            results: Vec::new(),
        }
    }

    /// Queue a statement. Fails once the transaction has started committing.
    pub fn add_query(
        &mut self,
        sql: impl Into<String>,
        params: Vec<QueryParam>,
    ) -> DbResult<&mut Self> {
        if self.state != TransactionState::Building {
            return Err(DbError::transaction(format!(
                "cannot add a query to a {} transaction",
                self.state
            )));
        }
        self.statements.push(QueuedStatement::new(sql, params));
        Ok(self)
    }

    /// Replace the no-op rollback handler. It runs after `ROLLBACK` when a
    /// queued statement fails.
    pub fn set_rollback<F>(&mut self, handler: F) -> &mut Self
    where
        F: FnMut(&DbError) + Send + 'static,
    {
        self.rollback = Box::new(handler);
        self
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn statements(&self) -> &[QueuedStatement] {
        &self.statements
    }

    /// Per-statement results collected so far. After a failed commit these
    /// are the results of the statements that ran before the failure.
    pub fn results(&self) -> &[QueryOutput] {
        &self.results
    }

    /// Run the queued statements atomically and return their results in
    /// order.
    ///
    /// A failing statement triggers `ROLLBACK` and the rollback handler; the
    /// statements after it never run and the error is returned. The
    /// transaction is not retried as a whole.
    ///
    /// Requires an open connection: without one the commit fails with
    /// [`DbError::NotConnected`] and nothing is sent.
    pub async fn commit(&mut self) -> DbResult<Vec<QueryOutput>> {
        if self.state != TransactionState::Building {
            return Err(DbError::transaction(format!(
                "cannot commit a {} transaction",
                self.state
            )));
        }
        self.state = TransactionState::Committing;

        let db = self.db;
        let mut session = db.state.lock().await;
        match self.run(db, &mut session).await {
            Ok(()) => {
                self.state = TransactionState::Committed;
                debug!(statements = self.statements.len(), "Transaction committed");
                Ok(self.results.clone())
            }
            Err(e) => {
                self.state = TransactionState::Failed;
                warn!(
                    error = %e,
                    completed = self.results.len(),
                    statements = self.statements.len(),
                    "Transaction failed"
                );
                Err(e)
            }
        }
    }

    async fn run(
        &mut self,
        db: &Database<D>,
        session: &mut SessionState<D::Connection>,
    ) -> DbResult<()> {
        if session.connection.is_none() {
            return Err(DbError::NotConnected);
        }
        // Surfaces runtime errors raised while the handle sat idle
        db.connect_locked(session).await?;
        if session.connection.is_none() {
            return Err(DbError::NotConnected);
        }

        db.query_locked(session, "START TRANSACTION", &[], None).await?;
        for statement in &self.statements {
            let output = db
                .query_locked(
                    session,
                    &statement.sql,
                    &statement.params,
                    Some(&mut *self.rollback),
                )
                .await?;
            self.results.push(output);
        }
        db.query_locked(session, "COMMIT", &[], None).await?;
        Ok(())
    }
}

impl<D: Driver> fmt::Debug for Transaction<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("statements", &self.statements)
            .field("state", &self.state)
            .field("results", &self.results.len())
            .finish_non_exhaustive()
    }
}
