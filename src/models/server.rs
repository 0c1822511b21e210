//! Server capacity and session models used by the zombie reaper.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// An idle server session selected for termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZombieSession {
    /// Server side session id (`information_schema.processlist.ID`).
    pub id: u64,
    /// Seconds the session has been sleeping.
    pub idle_secs: u64,
}

/// Cached result of the server capacity probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MaxConnectionsSnapshot {
    /// Effective connection limit for the configured user.
    pub total: u64,
    /// True when `max_user_connections` caps the user below the server limit.
    pub user_limited: bool,
    #[serde(skip)]
    pub last_refreshed: Option<Instant>,
}

/// Cached result of the server usage probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsedConnectionsSnapshot {
    /// Sessions counted against the effective limit.
    pub total: u64,
    /// Longest time, in seconds, any counted session has been in its current state.
    pub max_idle_age: u64,
    #[serde(skip)]
    pub last_refreshed: Option<Instant>,
}

/// Whether a snapshot refreshed at `last_refreshed` is due for a refresh.
///
/// A zero `interval` always refreshes.
pub fn refresh_due(last_refreshed: Option<Instant>, interval: Duration) -> bool {
    match last_refreshed {
        None => true,
        Some(_) if interval.is_zero() => true,
        Some(at) => at.elapsed() > interval,
    }
}
