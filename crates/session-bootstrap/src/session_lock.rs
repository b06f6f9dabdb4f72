//! Process-wide mutual exclusion for token exchange.
//!
//! Refresh tokens are single-use, so at most one run may redeem them. The
//! lock is not reentrant: a second acquire by the same owner fails. A holder
//! that outlives `stale_after` is treated as abandoned and may be taken over.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long a lock loser waits for the winner's session to appear.
pub const LOCK_WAIT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Poll interval while waiting on the winner.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
struct Holder {
    owner: String,
    acquired_at: Instant,
}

/// Single-slot exchange lock shared by every bootstrap run in the process.
#[derive(Debug)]
pub struct SessionLock {
    holder: Mutex<Option<Holder>>,
    stale_after: Duration,
}

impl Default for SessionLock {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLock {
    /// Create a lock whose holders go stale after [`LOCK_WAIT_TIMEOUT`].
    pub fn new() -> Self {
        Self::with_stale_after(LOCK_WAIT_TIMEOUT)
    }

    pub fn with_stale_after(stale_after: Duration) -> Self {
        Self {
            holder: Mutex::new(None),
            stale_after,
        }
    }

    /// Try to take the lock for `owner`. Returns false if anyone holds it,
    /// including `owner` itself.
    pub fn try_acquire(&self, owner: &str) -> bool {
        let mut holder = self.holder.lock();
        if let Some(current) = holder.as_ref() {
            if current.acquired_at.elapsed() < self.stale_after {
                return false;
            }
            warn!(
                stale_owner = %current.owner,
                new_owner = %owner,
                "Taking over stale session lock"
            );
        }
        *holder = Some(Holder {
            owner: owner.to_string(),
            acquired_at: Instant::now(),
        });
        debug!(owner = %owner, "Session lock acquired");
        true
    }

    /// Release the lock if `owner` holds it. A non-holder release is a no-op.
    pub fn release(&self, owner: &str) -> bool {
        let mut holder = self.holder.lock();
        match holder.as_ref() {
            Some(current) if current.owner == owner => {
                *holder = None;
                debug!(owner = %owner, "Session lock released");
                true
            }
            _ => false,
        }
    }

    /// Whether a live (non-stale) holder exists.
    pub fn is_held(&self) -> bool {
        self.holder
            .lock()
            .as_ref()
            .is_some_and(|h| h.acquired_at.elapsed() < self.stale_after)
    }

    pub fn owner(&self) -> Option<String> {
        self.holder.lock().as_ref().map(|h| h.owner.clone())
    }

    /// Drop any holder unconditionally. Used on sign-out and auth failure.
    pub fn force_release(&self) {
        if let Some(previous) = self.holder.lock().take() {
            debug!(owner = %previous.owner, "Session lock force-released");
        }
    }

    /// Acquire the lock and return a lease that releases it when dropped.
    pub fn acquire(self: &Arc<Self>, owner: &str) -> Option<SessionLockLease> {
        if self.try_acquire(owner) {
            Some(SessionLockLease {
                lock: Arc::clone(self),
                owner: owner.to_string(),
            })
        } else {
            None
        }
    }
}

/// Scoped ownership of a [`SessionLock`]. Releases on every exit path.
#[derive(Debug)]
pub struct SessionLockLease {
    lock: Arc<SessionLock>,
    owner: String,
}

impl SessionLockLease {
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl Drop for SessionLockLease {
    fn drop(&mut self) {
        self.lock.release(&self.owner);
    }
}
