//! Single-flight guard over whole bootstrap runs.
//!
//! While a run holds the guard, new triggers are dropped rather than queued.
//! `reset()` bumps an epoch so a token from before the reset cannot clear a
//! flag taken by a later run.

use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct GuardState {
    in_progress: bool,
    epoch: u64,
}

#[derive(Debug, Default)]
pub struct RedirectGuard {
    state: Mutex<GuardState>,
}

impl RedirectGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard. Returns `None` when a run is already in progress.
    pub fn try_begin(self: &Arc<Self>) -> Option<RedirectGuardToken> {
        let mut state = self.state.lock();
        if state.in_progress {
            return None;
        }
        state.in_progress = true;
        state.epoch += 1;
        Some(RedirectGuardToken {
            guard: Arc::clone(self),
            epoch: state.epoch,
        })
    }

    pub fn is_in_progress(&self) -> bool {
        self.state.lock().in_progress
    }

    /// Bumped by every `try_begin` and `reset`. A caller that saw epoch `n`
    /// can tell whether any run started since.
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Clear the flag regardless of who set it.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.in_progress = false;
        state.epoch += 1;
    }
}

/// Held for the duration of one run; clears the guard when dropped.
#[derive(Debug)]
pub struct RedirectGuardToken {
    guard: Arc<RedirectGuard>,
    epoch: u64,
}

impl Drop for RedirectGuardToken {
    fn drop(&mut self) {
        let mut state = self.guard.state.lock();
        if state.epoch == self.epoch {
            state.in_progress = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_begin_is_rejected() {
        let guard = Arc::new(RedirectGuard::new());
        let token = guard.try_begin();
        assert!(token.is_some());
        assert!(guard.is_in_progress());
        assert!(guard.try_begin().is_none());
    }

    #[test]
    fn test_drop_clears_flag() {
        let guard = Arc::new(RedirectGuard::new());
        drop(guard.try_begin().unwrap());
        assert!(!guard.is_in_progress());
        assert!(guard.try_begin().is_some());
    }

    #[test]
    fn test_epoch_advances_per_run_and_reset() {
        let guard = Arc::new(RedirectGuard::new());
        let seen = guard.epoch();
        drop(guard.try_begin().unwrap());
        assert_eq!(guard.epoch(), seen + 1);
        guard.reset();
        assert_eq!(guard.epoch(), seen + 2);
    }

    #[test]
    fn test_stale_token_does_not_clear_newer_run() {
        let guard = Arc::new(RedirectGuard::new());
        let old = guard.try_begin().unwrap();
        guard.reset();
        let _new = guard.try_begin().unwrap();
        drop(old);
        assert!(guard.is_in_progress());
    }
}
