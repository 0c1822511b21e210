//! Zombie session reaping.
//!
//! [`Database::end`] probes the server for its effective connection limit and
//! current usage, and kills sessions of the configured user that have been
//! sleeping too long. Under pressure the reap timeout adapts to the oldest
//! idle session; otherwise only sessions idle past `zombie_max_timeout` go.

use crate::db::driver::{Driver, DriverConnection};
use crate::db::lifecycle::{Database, SessionState};
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, Row, ZombieSession, refresh_due};
use serde_json::Value as JsonValue;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const MAX_CONNECTIONS_SQL: &str = "SELECT IF(@@max_user_connections > 0, \
     LEAST(@@max_user_connections, @@max_connections), @@max_connections) AS total, \
     IF(@@max_user_connections > 0, 1, 0) AS userLimit";

const USED_CONNECTIONS_SQL: &str = "SELECT COUNT(ID) AS total, MAX(time) AS max_age \
     FROM information_schema.processlist \
     WHERE user = ? OR @@max_user_connections = 0";

const ZOMBIES_SQL: &str = "SELECT ID, time FROM information_schema.processlist \
     WHERE command = 'Sleep' AND time >= ? AND user = ? \
     ORDER BY time DESC";

/// Idle age, in seconds, a session needs before it is reaped: the observed
/// `idle_age` clamped to `[min, max]`.
///
/// ```
/// use mysql_keeper::db::reap_timeout;
///
/// assert_eq!(reap_timeout(1, 3, 900), 3);
/// assert_eq!(reap_timeout(120, 3, 900), 120);
/// assert_eq!(reap_timeout(5000, 3, 900), 900);
/// ```
pub fn reap_timeout(idle_age: u64, min: u64, max: u64) -> u64 {
    idle_age.max(min).min(max)
}

impl<D: Driver> Database<D> {
    /// Adaptive shutdown. Does nothing when no connection is open.
    ///
    /// When utilization exceeds `conns_utilization`, sessions idle for at
    /// least [`reap_timeout`] of the oldest idle age are killed; if none could
    /// be killed this instance closes its own connection to shed load. Below
    /// the threshold, sessions idle past `zombie_max_timeout` are killed.
    pub async fn end(&self) -> DbResult<()> {
        let mut state = self.state.lock().await;
        if state.connection.is_none() {
            return Ok(());
        }

        self.refresh_max_connections(&mut state).await?;
        self.refresh_used_connections(&mut state).await?;

        let max = state.max_connections;
        let used = state.used_connections;
        let utilization = used.total as f64 / max.total as f64;
        info!(
            used = used.total,
            max = max.total,
            user_limited = max.user_limited,
            max_idle_age = used.max_idle_age,
            utilization,
            "Ending connection"
        );

        if utilization > self.config.conns_utilization {
            let timeout = reap_timeout(
                used.max_idle_age,
                self.config.zombie_min_timeout,
                self.config.zombie_max_timeout,
            );
            let reaped = self.reap_locked(&mut state, timeout).await?;
            if reaped == 0 {
                info!("No zombie sessions reaped, closing own connection");
                self.close_locked(&mut state).await;
            }
        } else if used.max_idle_age > self.config.zombie_max_timeout {
            self.reap_locked(&mut state, self.config.zombie_max_timeout).await?;
        }
        Ok(())
    }

    /// Kill sessions of the configured user that have been sleeping for at
    /// least `timeout` seconds. Returns how many were killed.
    ///
    /// Nothing happens when no connection is open or when `timeout` exceeds
    /// the oldest idle age seen by the last usage probe.
    pub async fn reap(&self, timeout: u64) -> DbResult<usize> {
        let mut state = self.state.lock().await;
        self.reap_locked(&mut state, timeout).await
    }

    async fn reap_locked(
        &self,
        state: &mut SessionState<D::Connection>,
        timeout: u64,
    ) -> DbResult<usize> {
        if state.connection.is_none() || timeout > state.used_connections.max_idle_age {
            debug!(
                timeout,
                max_idle_age = state.used_connections.max_idle_age,
                "Nothing idle long enough to reap"
            );
            return Ok(0);
        }

        let user = QueryParam::from(self.connection_config().user.as_str());
        let zombies: Vec<ZombieSession> = self
            .query_locked(state, ZOMBIES_SQL, &[QueryParam::UInt(timeout), user], None)
            .await?
            .rows
            .iter()
            .filter_map(zombie_from_row)
            .collect();

        let mut reaped = 0;
        let mut escalated = None;
        for zombie in zombies {
            if state.connection.is_none() {
                warn!(session_id = zombie.id, "Connection dropped, stopping zombie sweep");
                break;
            }
            match self.kill_locked(state, zombie.id).await {
                Ok(()) => {
                    debug!(
                        session_id = zombie.id,
                        idle_secs = zombie.idle_secs,
                        "Killed zombie session"
                    );
                    self.config.hooks.on_clear(&zombie);
                    reaped += 1;
                }
                Err(err) => {
                    warn!(session_id = zombie.id, error = %err, "Failed to kill zombie session");
                    if let Err(err) = self.config.hooks.on_clear_error(err) {
                        escalated.get_or_insert(err);
                    }
                }
            }
        }

        info!(timeout, reaped, "Zombie sweep finished");
        escalated.map_or(Ok(reaped), Err)
    }

    async fn kill_locked(
        &self,
        state: &mut SessionState<D::Connection>,
        session_id: u64,
    ) -> DbResult<()> {
        let Some(conn) = state.connection.as_mut() else {
            return Err(DbError::NotConnected);
        };
        let sql = conn
            .format("KILL ?", &[QueryParam::UInt(session_id)])
            .map_err(|e| DbError::reap(session_id, e))?;
        match conn.execute(&sql).await {
            Ok(_) => Ok(()),
            Err(e) => {
                if e.code.is_fatal_protocol() || e.code.is_recoverable_protocol() {
                    self.record_error();
                    state.discard();
                }
                Err(DbError::reap(session_id, e))
            }
        }
    }

    async fn refresh_max_connections(
        &self,
        state: &mut SessionState<D::Connection>,
    ) -> DbResult<()> {
        if !refresh_due(
            state.max_connections.last_refreshed,
            self.config.get_max_conns_freq,
        ) {
            return Ok(());
        }

        let output = self.query_locked(state, MAX_CONNECTIONS_SQL, &[], None).await?;
        if let Some(row) = output.first() {
            state.max_connections.total = u64_column(row, "total");
            state.max_connections.user_limited = u64_column(row, "userLimit") == 1;
            state.max_connections.last_refreshed = Some(Instant::now());
        }
        Ok(())
    }

    async fn refresh_used_connections(
        &self,
        state: &mut SessionState<D::Connection>,
    ) -> DbResult<()> {
        if !refresh_due(
            state.used_connections.last_refreshed,
            self.config.get_used_conns_freq,
        ) {
            return Ok(());
        }

        let user = QueryParam::from(self.connection_config().user.as_str());
        let output = self
            .query_locked(state, USED_CONNECTIONS_SQL, &[user], None)
            .await?;
        if let Some(row) = output.first() {
            state.used_connections.total = u64_column(row, "total");
            state.used_connections.max_idle_age = u64_column(row, "max_age");
            state.used_connections.last_refreshed = Some(Instant::now());
        }
        Ok(())
    }
}

fn zombie_from_row(row: &Row) -> Option<ZombieSession> {
    let id = row.get("ID").and_then(json_to_u64)?;
    Some(ZombieSession {
        id,
        idle_secs: u64_column(row, "time"),
    })
}

/// Numeric column that may arrive as a number, a decimal string or NULL.
fn u64_column(row: &Row, name: &str) -> u64 {
    row.get(name).and_then(json_to_u64).unwrap_or(0)
}

fn json_to_u64(value: &JsonValue) -> Option<u64> {
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        JsonValue::String(s) => s.trim().parse::<u64>().ok(),
        JsonValue::Bool(b) => Some(u64::from(*b)),
        _ => None,
    }
}
