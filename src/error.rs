//! Error types for mysql-keeper.
//!
//! Two layers are defined here:
//! - [`DriverError`] is what a driver adapter reports. Its [`ErrorCode`] is the
//!   only thing the lifecycle manager looks at when deciding whether to retry,
//!   reconnect or give up.
//! - [`DbError`] is what callers of [`Database`](crate::db::Database) see.

use std::fmt;
use thiserror::Error;

/// Classified MySQL client/server error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `ER_TOO_MANY_USER_CONNECTIONS` (1203)
    TooManyUserConnections,
    /// `ER_CON_COUNT_ERROR` (1040)
    ConnectionCountExceeded,
    /// `ER_USER_LIMIT_REACHED` (1226)
    UserLimitReached,
    /// `ER_OUT_OF_RESOURCES` (1041)
    OutOfResources,
    /// Server closed the connection or the socket was reset.
    ConnectionLost,
    /// Packets arrived out of sequence or the protocol stalled.
    SequenceTimeout,
    /// Network level timeout.
    TimedOut,
    /// Write on a closed socket.
    BrokenPipe,
    /// Command queued after `COM_QUIT` was sent.
    EnqueueAfterQuit,
    /// Command queued after a fatal error on the connection.
    EnqueueAfterFatalError,
    /// Command queued after the connection was destroyed.
    EnqueueAfterDestroy,
    /// Any other server error, by MySQL error number.
    Server(u16),
    /// Client side error without a more specific class.
    Client,
}

impl ErrorCode {
    /// Map a MySQL server error number onto a code.
    pub fn from_mysql_number(number: u16) -> Self {
        match number {
            1040 => Self::ConnectionCountExceeded,
            1041 => Self::OutOfResources,
            1203 => Self::TooManyUserConnections,
            1226 => Self::UserLimitReached,
            other => Self::Server(other),
        }
    }

    /// Symbolic name, as printed in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TooManyUserConnections => "ER_TOO_MANY_USER_CONNECTIONS",
            Self::ConnectionCountExceeded => "ER_CON_COUNT_ERROR",
            Self::UserLimitReached => "ER_USER_LIMIT_REACHED",
            Self::OutOfResources => "ER_OUT_OF_RESOURCES",
            Self::ConnectionLost => "PROTOCOL_CONNECTION_LOST",
            Self::SequenceTimeout => "PROTOCOL_SEQUENCE_TIMEOUT",
            Self::TimedOut => "ETIMEDOUT",
            Self::BrokenPipe => "EPIPE",
            Self::EnqueueAfterQuit => "PROTOCOL_ENQUEUE_AFTER_QUIT",
            Self::EnqueueAfterFatalError => "PROTOCOL_ENQUEUE_AFTER_FATAL_ERROR",
            Self::EnqueueAfterDestroy => "PROTOCOL_ENQUEUE_AFTER_DESTROY",
            Self::Server(_) => "ER_SERVER",
            Self::Client => "ER_CLIENT",
        }
    }

    /// Failures worth retrying while establishing a connection: server
    /// connection limits, resource exhaustion and lost/timed out transports.
    pub fn is_transient_connect(&self) -> bool {
        matches!(
            self,
            Self::TooManyUserConnections
                | Self::ConnectionCountExceeded
                | Self::UserLimitReached
                | Self::OutOfResources
                | Self::ConnectionLost
                | Self::SequenceTimeout
                | Self::TimedOut
        )
    }

    /// The connection is unusable and must be destroyed; never retried.
    pub fn is_fatal_protocol(&self) -> bool {
        matches!(self, Self::SequenceTimeout)
    }

    /// The statement never reached a healthy server session, so re-issuing it
    /// on a fresh connection is expected to succeed.
    pub fn is_recoverable_protocol(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost
                | Self::BrokenPipe
                | Self::EnqueueAfterQuit
                | Self::EnqueueAfterFatalError
                | Self::EnqueueAfterDestroy
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(number) => write!(f, "ER_SERVER({})", number),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Error reported by a driver adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct DriverError {
    pub code: ErrorCode,
    pub message: String,
}

impl DriverError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum DbError {
    #[error("Connection failed after {retries} retries: {source}")]
    Connect {
        #[source]
        source: DriverError,
        retries: u32,
    },

    /// The handle was destroyed before this error was returned.
    #[error("Fatal protocol error: {0}")]
    FatalProtocol(#[source] DriverError),

    /// A recoverable connection loss that recurred on the single retry.
    #[error("Connection lost: {0}")]
    ConnectionLost(#[source] DriverError),

    #[error("Query failed: {0}")]
    Query(#[source] DriverError),

    /// Asynchronous error observed on the live handle.
    #[error("Connection error: {0}")]
    Runtime(#[source] DriverError),

    #[error("Failed to clear zombie connection {session_id}: {source}")]
    Reap {
        session_id: u64,
        #[source]
        source: DriverError,
    },

    #[error("No database connection available")]
    NotConnected,

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl DbError {
    /// Create a connect error carrying the number of retries already spent.
    pub fn connect(source: DriverError, retries: u32) -> Self {
        Self::Connect { source, retries }
    }

    /// Create a reap error for one session.
    pub fn reap(session_id: u64, source: DriverError) -> Self {
        Self::Reap { session_id, source }
    }

    /// Create a transaction state error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// The underlying driver error, if this error came from the driver.
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            Self::Connect { source, .. } | Self::Reap { source, .. } => Some(source),
            Self::FatalProtocol(e) | Self::ConnectionLost(e) | Self::Query(e) | Self::Runtime(e) => {
                Some(e)
            }
            _ => None,
        }
    }

    /// The underlying driver error code, if any.
    pub fn driver_code(&self) -> Option<ErrorCode> {
        self.driver_error().map(|e| e.code)
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect { source, .. } => source.code.is_transient_connect(),
            Self::ConnectionLost(_) | Self::Runtime(_) => true,
            _ => false,
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_numbers_map_to_limit_codes() {
        assert_eq!(
            ErrorCode::from_mysql_number(1040),
            ErrorCode::ConnectionCountExceeded
        );
        assert_eq!(ErrorCode::from_mysql_number(1041), ErrorCode::OutOfResources);
        assert_eq!(
            ErrorCode::from_mysql_number(1203),
            ErrorCode::TooManyUserConnections
        );
        assert_eq!(
            ErrorCode::from_mysql_number(1226),
            ErrorCode::UserLimitReached
        );
        assert_eq!(ErrorCode::from_mysql_number(1064), ErrorCode::Server(1064));
    }

    #[test]
    fn test_transient_connect_codes() {
        assert!(ErrorCode::ConnectionCountExceeded.is_transient_connect());
        assert!(ErrorCode::TooManyUserConnections.is_transient_connect());
        assert!(ErrorCode::TimedOut.is_transient_connect());
        assert!(ErrorCode::ConnectionLost.is_transient_connect());
        assert!(!ErrorCode::Server(1045).is_transient_connect());
        assert!(!ErrorCode::BrokenPipe.is_transient_connect());
    }

    #[test]
    fn test_protocol_classes_are_disjoint() {
        let codes = [
            ErrorCode::ConnectionLost,
            ErrorCode::SequenceTimeout,
            ErrorCode::BrokenPipe,
            ErrorCode::EnqueueAfterQuit,
            ErrorCode::EnqueueAfterFatalError,
            ErrorCode::EnqueueAfterDestroy,
            ErrorCode::Server(1146),
        ];
        for code in codes {
            assert!(
                !(code.is_fatal_protocol() && code.is_recoverable_protocol()),
                "{} is both fatal and recoverable",
                code
            );
        }
        assert!(ErrorCode::SequenceTimeout.is_fatal_protocol());
        assert!(ErrorCode::EnqueueAfterDestroy.is_recoverable_protocol());
        assert!(!ErrorCode::Server(1146).is_recoverable_protocol());
    }

    #[test]
    fn test_error_display() {
        let err = DbError::connect(
            DriverError::new(ErrorCode::ConnectionCountExceeded, "Too many connections"),
            3,
        );
        let msg = err.to_string();
        assert!(msg.contains("after 3 retries"));
        assert!(msg.contains("ER_CON_COUNT_ERROR"));
    }

    #[test]
    fn test_server_code_display_includes_number() {
        assert_eq!(ErrorCode::Server(1146).to_string(), "ER_SERVER(1146)");
    }

    #[test]
    fn test_driver_code() {
        let err = DbError::Query(DriverError::new(ErrorCode::Server(1064), "syntax"));
        assert_eq!(err.driver_code(), Some(ErrorCode::Server(1064)));
        assert_eq!(DbError::NotConnected.driver_code(), None);
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::ConnectionLost(DriverError::new(ErrorCode::BrokenPipe, "")).is_retryable());
        assert!(!DbError::Query(DriverError::new(ErrorCode::Server(1064), "")).is_retryable());
        assert!(!DbError::invalid_input("bad").is_retryable());
    }
}
