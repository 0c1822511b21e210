//! sqlx backed MySQL driver adapter.
//!
//! Each [`MySqlDriver::connect`] opens one dedicated `sqlx::MySqlConnection`;
//! there is no pool underneath. Statements are sent as already formatted text
//! so a single call may carry several `;`-separated statements.

use crate::db::driver::{Driver, DriverConnection};
use crate::db::params::format_query;
use crate::db::types::row_to_json;
use crate::error::{DriverError, ErrorCode};
use crate::models::{ConnectionConfig, QueryOutput, QueryParam};
use futures_util::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlDatabaseError};
use sqlx::{ConnectOptions, Connection, Either, Executor};
use std::io::ErrorKind;
use tracing::debug;

/// Opens plain MySQL connections with sqlx.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDriver;

impl MySqlDriver {
    pub fn new() -> Self {
        Self
    }

    fn connect_options(config: &ConnectionConfig) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .charset(&config.charset);

        if let Some(password) = &config.password {
            options = options.password(password);
        }
        if let Some(database) = &config.database {
            options = options.database(database);
        }
        options
    }
}

impl Driver for MySqlDriver {
    type Connection = MySqlDriverConnection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Connection, DriverError> {
        let mut conn = Self::connect_options(config).connect().await?;

        let session_id = match sqlx::query_scalar::<_, u64>("SELECT CONNECTION_ID()")
            .fetch_one(&mut conn)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                debug!(error = %e, "Could not read CONNECTION_ID()");
                None
            }
        };

        Ok(MySqlDriverConnection { conn, session_id })
    }
}

/// A live sqlx MySQL connection.
pub struct MySqlDriverConnection {
    conn: sqlx::MySqlConnection,
    session_id: Option<u64>,
}

impl std::fmt::Debug for MySqlDriverConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlDriverConnection")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl DriverConnection for MySqlDriverConnection {
    fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    // sqlx hands out connections only after the handshake completed.
    async fn reconnect(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn format(&self, sql: &str, params: &[QueryParam]) -> Result<String, DriverError> {
        format_query(sql, params)
    }

    async fn execute(&mut self, sql: &str) -> Result<QueryOutput, DriverError> {
        let mut output = QueryOutput::default();
        let mut stream = (&mut self.conn).fetch_many(sql);

        while let Some(step) = stream.try_next().await? {
            match step {
                Either::Left(done) => {
                    output.affected_rows += done.rows_affected();
                    if done.last_insert_id() > 0 {
                        output.last_insert_id = Some(done.last_insert_id());
                    }
                }
                Either::Right(row) => output.rows.push(row_to_json(&row)),
            }
        }

        Ok(output)
    }

    async fn end(self) -> Result<(), DriverError> {
        self.conn.close().await?;
        Ok(())
    }

    fn destroy(self) {
        drop(self.conn);
    }
}

impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                let code = db_err
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .map(|e| ErrorCode::from_mysql_number(e.number()))
                    .unwrap_or(ErrorCode::Client);
                DriverError::new(code, db_err.message())
            }
            sqlx::Error::Io(io_err) => {
                let code = match io_err.kind() {
                    ErrorKind::BrokenPipe => ErrorCode::BrokenPipe,
                    ErrorKind::TimedOut => ErrorCode::TimedOut,
                    ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::NotConnected => ErrorCode::ConnectionLost,
                    _ => ErrorCode::Client,
                };
                DriverError::new(code, format!("I/O error: {}", io_err))
            }
            sqlx::Error::Protocol(msg) => {
                DriverError::new(ErrorCode::SequenceTimeout, format!("Protocol error: {}", msg))
            }
            sqlx::Error::PoolTimedOut => {
                DriverError::new(ErrorCode::TimedOut, "Timed out acquiring connection")
            }
            _ => DriverError::new(ErrorCode::Client, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_map_to_connection_codes() {
        let err: DriverError =
            sqlx::Error::Io(std::io::Error::new(ErrorKind::BrokenPipe, "pipe")).into();
        assert_eq!(err.code, ErrorCode::BrokenPipe);

        let err: DriverError =
            sqlx::Error::Io(std::io::Error::new(ErrorKind::ConnectionReset, "reset")).into();
        assert_eq!(err.code, ErrorCode::ConnectionLost);

        let err: DriverError =
            sqlx::Error::Io(std::io::Error::new(ErrorKind::TimedOut, "slow")).into();
        assert_eq!(err.code, ErrorCode::TimedOut);
        assert!(err.message.contains("slow"));
    }

    #[test]
    fn test_protocol_error_is_fatal() {
        let err: DriverError = sqlx::Error::Protocol("out of order packet".into()).into();
        assert!(err.code.is_fatal_protocol());
    }

    #[test]
    fn test_other_errors_are_client_errors() {
        let err: DriverError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.code, ErrorCode::Client);
    }

    #[test]
    fn test_connect_options_from_config() {
        let config = ConnectionConfig::new("db.local", "app")
            .with_port(3307)
            .with_database("shop");
        let options = MySqlDriver::connect_options(&config);
        assert_eq!(options.get_host(), "db.local");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_username(), "app");
        assert_eq!(options.get_database(), Some("shop"));
    }
}
