//! Lifecycle callbacks.
//!
//! Every method has a default: notifications are no-ops and error callbacks
//! hand the error back, which makes the calling operation fail with it.
//! Override only the methods you care about:
//!
//! ```
//! use mysql_keeper::error::{DbError, DbResult};
//! use mysql_keeper::hooks::LifecycleHooks;
//! use mysql_keeper::models::ZombieSession;
//!
//! struct Quiet;
//!
//! impl LifecycleHooks for Quiet {
//!     fn on_clear(&self, zombie: &ZombieSession) {
//!         println!("killed session {} after {}s", zombie.id, zombie.idle_secs);
//!     }
//!
//!     fn on_clear_error(&self, _err: DbError) -> DbResult<()> {
//!         Ok(())
//!     }
//! }
//! ```

use crate::error::{DbError, DbResult};
use crate::models::{SessionInfo, ZombieSession};

pub trait LifecycleHooks: Send + Sync {
    /// A new connection was established.
    fn on_connect(&self, _session: &SessionInfo) {}

    /// Connecting failed for good. Returning `Ok` swallows the error and the
    /// instance stays disconnected.
    fn on_connect_error(&self, err: DbError) -> DbResult<()> {
        Err(err)
    }

    /// A zombie session was killed.
    fn on_clear(&self, _zombie: &ZombieSession) {}

    /// Killing a zombie session failed. The remaining kills run regardless.
    fn on_clear_error(&self, err: DbError) -> DbResult<()> {
        Err(err)
    }

    /// The live connection reported an asynchronous error and was discarded.
    fn on_error(&self, err: DbError) -> DbResult<()> {
        Err(err)
    }

    /// The connection was closed with [`Database::close`](crate::db::Database::close).
    fn on_close(&self) {}
}

/// Hooks that keep every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl LifecycleHooks for DefaultHooks {}
