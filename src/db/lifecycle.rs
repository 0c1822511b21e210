//! Connection lifecycle management.
//!
//! A [`Database`] owns at most one driver connection. It is opened lazily by
//! the first operation that needs it, re-opened with a bounded, fixed-delay
//! retry when the server is temporarily refusing connections, and discarded
//! when the driver reports it broken.
//!
//! All operations take `&self`. The session state sits behind a
//! `tokio::sync::Mutex` that is held for the duration of one operation, so
//! statements issued concurrently on the same instance are sent one after
//! another, the way a driver command queue would send them.

use crate::config::RuntimeConfig;
use crate::db::driver::{Driver, DriverConnection};
use crate::db::mysql::MySqlDriver;
use crate::error::{DbError, DbResult};
use crate::models::{
    ConnectionConfig, MaxConnectionsSnapshot, SessionInfo, UsedConnectionsSnapshot,
};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Mutable per-instance state, guarded by [`Database::state`].
pub(crate) struct SessionState<C> {
    pub(crate) connection: Option<C>,
    pub(crate) max_connections: MaxConnectionsSnapshot,
    pub(crate) used_connections: UsedConnectionsSnapshot,
}

impl<C: DriverConnection> SessionState<C> {
    fn new() -> Self {
        Self {
            connection: None,
            max_connections: MaxConnectionsSnapshot::default(),
            used_connections: UsedConnectionsSnapshot::default(),
        }
    }

    /// Tear down the handle, if any, without a graceful goodbye.
    pub(crate) fn discard(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.destroy();
        }
    }
}

/// A single self-healing MySQL connection.
pub struct Database<D: Driver = MySqlDriver> {
    driver: D,
    connection_config: ConnectionConfig,
    pub(crate) config: RuntimeConfig,
    pub(crate) state: Mutex<SessionState<D::Connection>>,
    retries: AtomicU32,
    errors: AtomicU64,
}

impl Database<MySqlDriver> {
    /// Create an instance backed by the sqlx MySQL driver.
    pub fn mysql(connection_config: ConnectionConfig, config: RuntimeConfig) -> Self {
        Self::new(MySqlDriver::new(), connection_config, config)
    }
}

impl<D: Driver> Database<D> {
    /// Create a disconnected instance. Nothing is opened until the first
    /// operation that needs a connection.
    pub fn new(driver: D, connection_config: ConnectionConfig, config: RuntimeConfig) -> Self {
        Self {
            driver,
            connection_config,
            config,
            state: Mutex::new(SessionState::new()),
            retries: AtomicU32::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn connection_config(&self) -> &ConnectionConfig {
        &self.connection_config
    }

    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Connect retries spent since the last successful connect.
    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Connection level errors observed over the lifetime of this instance.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connection.is_some()
    }

    /// Last capacity probe result.
    pub async fn max_connections(&self) -> MaxConnectionsSnapshot {
        self.state.lock().await.max_connections
    }

    /// Last usage probe result.
    pub async fn used_connections(&self) -> UsedConnectionsSnapshot {
        self.state.lock().await.used_connections
    }

    /// Make sure a connection exists, opening one if needed.
    ///
    /// Transient failures (connection limits, exhausted resources, lost or
    /// timed out transports) are retried up to `max_retries` times with
    /// `sleep_gap` between attempts. Anything else, or running out of
    /// retries, goes to [`on_connect_error`](crate::hooks::LifecycleHooks::on_connect_error).
    pub async fn connect(&self) -> DbResult<()> {
        let mut state = self.state.lock().await;
        self.connect_locked(&mut state).await
    }

    pub(crate) async fn connect_locked(
        &self,
        state: &mut SessionState<D::Connection>,
    ) -> DbResult<()> {
        self.observe_runtime_errors(state)?;

        if let Some(conn) = state.connection.as_mut() {
            if !conn.is_connecting() {
                if let Err(e) = conn.reconnect().await {
                    warn!(error = %e, "Reconnect on existing connection failed");
                }
            }
            return Ok(());
        }

        loop {
            match self.driver.connect(&self.connection_config).await {
                Ok(conn) => {
                    self.retries.store(0, Ordering::Relaxed);
                    let session = SessionInfo {
                        session_id: conn.session_id(),
                        host: self.connection_config.host.clone(),
                        port: self.connection_config.port,
                        user: self.connection_config.user.clone(),
                    };
                    state.connection = Some(conn);

                    info!(
                        url = %self.connection_config.masked_url(),
                        session_id = ?session.session_id,
                        "Connected to MySQL"
                    );
                    self.config.hooks.on_connect(&session);
                    return Ok(());
                }
                Err(e) => {
                    let retries = self.retries.load(Ordering::Relaxed);
                    if e.code.is_transient_connect() && retries < self.config.max_retries {
                        self.retries.store(retries + 1, Ordering::Relaxed);
                        warn!(
                            error = %e,
                            retry = retries + 1,
                            max_retries = self.config.max_retries,
                            sleep_ms = self.config.sleep_gap.as_millis() as u64,
                            "Transient connect failure, retrying"
                        );
                        tokio::time::sleep(self.config.sleep_gap).await;
                        continue;
                    }

                    warn!(error = %e, retries, "Giving up connecting");
                    return self.config.hooks.on_connect_error(DbError::connect(e, retries));
                }
            }
        }
    }

    /// Drain errors the live connection raised since the last operation. Any
    /// error discards the handle and is reported through `on_error`.
    fn observe_runtime_errors(&self, state: &mut SessionState<D::Connection>) -> DbResult<()> {
        let Some(conn) = state.connection.as_mut() else {
            return Ok(());
        };
        let errors = conn.take_runtime_errors();
        if errors.is_empty() {
            return Ok(());
        }

        self.errors.fetch_add(errors.len() as u64, Ordering::Relaxed);
        state.discard();

        let mut escalated = None;
        for e in errors {
            warn!(error = %e, "Connection reported an error, discarding it");
            if let Err(err) = self.config.hooks.on_error(DbError::Runtime(e)) {
                escalated.get_or_insert(err);
            }
        }
        escalated.map_or(Ok(()), Err)
    }

    /// Count a connection level failure seen while executing a statement.
    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Gracefully end the connection, if one is open, and call `on_close`.
    pub async fn close(&self) -> DbResult<()> {
        let mut state = self.state.lock().await;
        self.close_locked(&mut state).await;
        Ok(())
    }

    pub(crate) async fn close_locked(&self, state: &mut SessionState<D::Connection>) {
        let Some(conn) = state.connection.take() else {
            debug!("close() without an open connection");
            return;
        };

        // Discarded even when the goodbye fails
        if let Err(e) = conn.end().await {
            warn!(error = %e, "Error while ending connection");
        }
        info!(url = %self.connection_config.masked_url(), "Connection closed");
        self.config.hooks.on_close();
    }
}

impl<D: Driver> std::fmt::Debug for Database<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("connection_config", &self.connection_config)
            .field("config", &self.config)
            .field("retries", &self.retries())
            .field("errors", &self.error_count())
            .finish_non_exhaustive()
    }
}
