//! Bootstrap orchestration: one run from trigger to navigation.
//!
//! A run is started by a deep link or by the screen mounting. The
//! [`RedirectGuard`] keeps runs single-flight, the [`SessionLock`] keeps the
//! token exchange single-flight across everything that shares it, and the
//! last-URL memo makes a re-delivered link a no-op. Work that finishes after
//! the screen unmounts, or after sign-out replaced the run, is discarded
//! instead of navigating.
//!
//! Failures are routed by [`ErrorClass`]:
//! - timeout: default entry, or the error view once timeouts repeat
//! - unconfirmed session: default entry
//! - network: error view with retry
//! - auth: clear the lock and session, then the session-expired view
//! - anything else: error view with retry

use crate::bootstrap_fsm::{
    BootstrapMachine, BootstrapMachineInput, BootstrapState, BootstrapStateChangedPayload,
};
use crate::deep_link::{extract_tokens, redact_url};
use crate::error::{BootstrapError, BootstrapResult, ErrorClass, SessionStoreResult};
use crate::profile::{ProfileApi, ProfileFetcher};
use crate::redirect::{decide, ErrorViewKind, NavigationTarget, Navigator};
use crate::redirect_guard::RedirectGuard;
use crate::session::{Session, SessionStore};
use crate::session_exchange::SessionExchange;
use crate::session_lock::SessionLock;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Consecutive timeouts before the user is shown an error instead of the
/// default entry screen.
pub const TIMEOUT_SURFACE_THRESHOLD: u32 = 2;

const TRIGGER_QUEUE_CAPACITY: usize = 16;

/// What started a run.
#[derive(Clone, PartialEq, Eq)]
pub enum BootstrapTrigger {
    /// A deep-link URL became available.
    DeepLink(String),
    /// The screen mounted; only an existing session can be used.
    Mounted,
}

impl fmt::Display for BootstrapTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapTrigger::DeepLink(url) => write!(f, "deep_link({})", redact_url(url)),
            BootstrapTrigger::Mounted => write!(f, "mounted"),
        }
    }
}

impl fmt::Debug for BootstrapTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Why a trigger did not start a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    AlreadyInProgress,
    DuplicateUrl,
}

/// Result of handling one trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The navigator was called with this target.
    Navigated(NavigationTarget),
    /// No run was started.
    Ignored(IgnoreReason),
    /// The run finished after unmount; its result was dropped.
    Discarded,
}

/// Point-in-time view of the orchestrator, safe to log or print.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapSnapshot {
    pub state: BootstrapState,
    pub in_progress: bool,
    pub lock_held: bool,
    pub mounted: bool,
    pub timeout_streak: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_url: Option<String>,
}

/// A trigger plus the guard epoch it was queued under.
struct QueuedTrigger {
    trigger: BootstrapTrigger,
    epoch: u64,
}

/// Callback type for bootstrap state change notifications.
pub type BootstrapStateCallback = Box<dyn Fn(BootstrapStateChangedPayload) + Send + Sync>;

pub struct BootstrapOrchestrator {
    exchange: SessionExchange,
    profiles: ProfileFetcher,
    navigator: Arc<dyn Navigator>,
    lock: Arc<SessionLock>,
    guard: Arc<RedirectGuard>,
    mounted: AtomicBool,
    fsm: Mutex<BootstrapMachine>,
    /// Run allowed to drive the FSM and navigate. Cleared by sign-out.
    active_run: Mutex<Option<String>>,
    /// Last deep-link URL a run was started for.
    last_url: Mutex<Option<String>>,
    last_trigger: Mutex<Option<BootstrapTrigger>>,
    timeout_streak: AtomicU32,
    state_callback: Mutex<Option<BootstrapStateCallback>>,
    sender: mpsc::Sender<QueuedTrigger>,
    receiver: Mutex<Option<mpsc::Receiver<QueuedTrigger>>>,
}

impl BootstrapOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        api: Arc<dyn ProfileApi>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(TRIGGER_QUEUE_CAPACITY);
        Self {
            exchange: SessionExchange::new(store),
            profiles: ProfileFetcher::new(api),
            navigator,
            lock: Arc::new(SessionLock::new()),
            guard: Arc::new(RedirectGuard::new()),
            mounted: AtomicBool::new(true),
            fsm: Mutex::new(BootstrapMachine::new()),
            active_run: Mutex::new(None),
            last_url: Mutex::new(None),
            last_trigger: Mutex::new(None),
            timeout_streak: AtomicU32::new(0),
            state_callback: Mutex::new(None),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Share a process-wide exchange lock with other sign-in paths.
    pub fn with_lock(mut self, lock: Arc<SessionLock>) -> Self {
        self.lock = lock;
        self
    }

    pub fn lock(&self) -> &Arc<SessionLock> {
        &self.lock
    }

    /// Set a callback to be notified of bootstrap state changes.
    pub fn set_state_callback(&self, callback: BootstrapStateCallback) {
        *self.state_callback.lock() = Some(callback);
    }

    /// Current FSM state.
    pub fn fsm_state(&self) -> BootstrapState {
        BootstrapState::from(self.fsm.lock().state())
    }

    pub fn mount(&self) {
        self.mounted.store(true, Ordering::SeqCst);
    }

    /// Mark the consuming screen as gone. In-flight work keeps running but
    /// its result is discarded.
    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> BootstrapSnapshot {
        BootstrapSnapshot {
            state: self.fsm_state(),
            in_progress: self.guard.is_in_progress(),
            lock_held: self.lock.is_held(),
            mounted: self.is_mounted(),
            timeout_streak: self.timeout_streak.load(Ordering::SeqCst),
            last_url: self.last_url.lock().as_deref().map(redact_url),
        }
    }

    /// Handle one trigger to completion.
    pub async fn handle(&self, trigger: BootstrapTrigger) -> BootstrapOutcome {
        let Some(_guard) = self.guard.try_begin() else {
            debug!(trigger = %trigger, "Bootstrap already in progress, ignoring trigger");
            return BootstrapOutcome::Ignored(IgnoreReason::AlreadyInProgress);
        };

        if let BootstrapTrigger::DeepLink(url) = &trigger {
            let mut last_url = self.last_url.lock();
            if last_url.as_deref() == Some(url.as_str()) {
                debug!(url = %redact_url(url), "Deep link already processed, ignoring");
                return BootstrapOutcome::Ignored(IgnoreReason::DuplicateUrl);
            }
            *last_url = Some(url.clone());
        }
        *self.last_trigger.lock() = Some(trigger.clone());

        let run_id = Uuid::new_v4().to_string();
        *self.active_run.lock() = Some(run_id.clone());
        info!(run_id = %run_id, trigger = %trigger, "Bootstrap run started");

        let result = self.execute(&trigger, &run_id).await;
        let outcome = if !self.is_current(&run_id) {
            info!(run_id = %run_id, "Bootstrap run superseded, discarding result");
            BootstrapOutcome::Discarded
        } else {
            match result {
                Ok(target) => self.complete(target, &run_id),
                Err(BootstrapError::Unmounted) => self.abandon(&run_id),
                Err(e) => self.fail(e, &run_id).await,
            }
        };

        let mut active = self.active_run.lock();
        if active.as_deref() == Some(run_id.as_str()) {
            *active = None;
        }
        outcome
    }

    /// Re-run the last trigger, including a deep link that was already seen.
    ///
    /// Returns `None` if nothing has been handled yet.
    pub async fn retry(&self) -> Option<BootstrapOutcome> {
        let trigger = self.last_trigger.lock().clone()?;
        if self.guard.is_in_progress() {
            return Some(BootstrapOutcome::Ignored(IgnoreReason::AlreadyInProgress));
        }
        self.last_url.lock().take();
        info!(trigger = %trigger, "Retrying bootstrap");
        Some(self.handle(trigger).await)
    }

    /// Clear the session and every piece of run state. A run still in
    /// flight finishes but its result is discarded.
    pub async fn sign_out(&self) -> SessionStoreResult<()> {
        self.active_run.lock().take();
        self.lock.force_release();
        self.guard.reset();
        self.last_url.lock().take();
        self.last_trigger.lock().take();
        self.timeout_streak.store(0, Ordering::SeqCst);
        self.reset_fsm(None);

        self.exchange.store().clear_session().await?;
        info!("Signed out, bootstrap state cleared");
        Ok(())
    }

    /// Queue handle for triggers. Triggers sent while a run is in progress
    /// are dropped, and so are triggers still queued when a run starts.
    pub fn trigger_sender(&self) -> TriggerSender {
        TriggerSender {
            sender: self.sender.clone(),
            guard: Arc::clone(&self.guard),
        }
    }

    /// Spawn the loop that handles queued triggers one at a time.
    ///
    /// Returns `None` if the loop was already started.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut receiver = self.receiver.lock().take()?;
        let orchestrator = Arc::clone(self);

        Some(tokio::spawn(async move {
            while let Some(queued) = receiver.recv().await {
                if orchestrator.guard.epoch() != queued.epoch {
                    debug!(
                        trigger = %queued.trigger,
                        "Run started since trigger was queued, dropping"
                    );
                    continue;
                }
                let outcome = orchestrator.handle(queued.trigger).await;
                debug!(outcome = ?outcome, "Queued trigger handled");
            }
            debug!("Bootstrap trigger queue closed");
        }))
    }

    async fn execute(
        &self,
        trigger: &BootstrapTrigger,
        run_id: &str,
    ) -> BootstrapResult<NavigationTarget> {
        self.transition(&BootstrapMachineInput::Start, run_id)?;
        self.ensure_mounted()?;

        if self.lock.is_held() {
            info!(run_id = %run_id, "Exchange in progress elsewhere, waiting for session");
            return self.wait_then_route(run_id).await;
        }

        match self.exchange.store().get_session().await? {
            Some(session) if session.is_expired() => {
                debug!(
                    run_id = %run_id,
                    user_id = %session.user_id,
                    "Existing session expired, ignoring"
                );
            }
            Some(session) => {
                self.ensure_mounted()?;
                debug!(run_id = %run_id, user_id = %session.user_id, "Existing session found");
                self.transition(&BootstrapMachineInput::SessionPresent, run_id)?;
                return self.route(&session, run_id).await;
            }
            None => {}
        }

        let tokens = match trigger {
            BootstrapTrigger::DeepLink(url) => extract_tokens(url),
            BootstrapTrigger::Mounted => None,
        };
        let Some(tokens) = tokens else {
            info!(run_id = %run_id, "No session and no tokens, using default entry");
            self.transition(&BootstrapMachineInput::NoCredentials, run_id)?;
            return Ok(NavigationTarget::DefaultEntry);
        };

        let Some(lease) = self.lock.acquire(run_id) else {
            info!(run_id = %run_id, "Lost exchange lock race, waiting for session");
            return self.wait_then_route(run_id).await;
        };
        self.transition(&BootstrapMachineInput::LockAcquired, run_id)?;

        self.exchange.exchange(&tokens).await?;
        self.ensure_mounted()?;
        self.transition(&BootstrapMachineInput::Exchanged, run_id)?;

        let session = self.exchange.settle_and_verify().await?;
        drop(lease);
        self.ensure_mounted()?;
        info!(run_id = %run_id, user_id = %session.user_id, "Session verified");
        self.transition(&BootstrapMachineInput::Verified, run_id)?;

        self.route(&session, run_id).await
    }

    async fn wait_then_route(&self, run_id: &str) -> BootstrapResult<NavigationTarget> {
        self.transition(&BootstrapMachineInput::LockContended, run_id)?;
        let session = self.exchange.wait_for_session(&self.mounted).await?;
        self.ensure_mounted()?;
        self.transition(&BootstrapMachineInput::SessionAppeared, run_id)?;
        self.route(&session, run_id).await
    }

    async fn route(&self, session: &Session, run_id: &str) -> BootstrapResult<NavigationTarget> {
        let profile = self.profiles.fetch_user(&session.access_token).await?;
        self.ensure_mounted()?;
        self.transition(&BootstrapMachineInput::ProfileFetched, run_id)?;

        let target = decide(Some(&profile));
        info!(
            run_id = %run_id,
            user_id = %profile.id,
            role = profile.role().as_str(),
            profile_complete = profile.profile_complete,
            target = ?target,
            "Redirect decided"
        );
        self.transition(&BootstrapMachineInput::Decided, run_id)?;
        Ok(target.into())
    }

    fn complete(&self, target: NavigationTarget, run_id: &str) -> BootstrapOutcome {
        if !self.is_mounted() {
            return self.abandon(run_id);
        }
        self.navigator.navigate(&target);
        self.timeout_streak.store(0, Ordering::SeqCst);
        if let Err(e) = self.transition(&BootstrapMachineInput::Navigated, run_id) {
            warn!(run_id = %run_id, error = %e, "Resetting bootstrap state");
            self.reset_fsm(Some(run_id));
        }
        info!(run_id = %run_id, target = %target, "Bootstrap run navigated");
        BootstrapOutcome::Navigated(target)
    }

    fn abandon(&self, run_id: &str) -> BootstrapOutcome {
        info!(run_id = %run_id, "Bootstrap target unmounted, discarding result");
        if self
            .transition(&BootstrapMachineInput::Abandon, run_id)
            .is_err()
        {
            self.reset_fsm(Some(run_id));
        }
        BootstrapOutcome::Discarded
    }

    async fn fail(&self, error: BootstrapError, run_id: &str) -> BootstrapOutcome {
        let class = error.class();
        warn!(
            run_id = %run_id,
            error = %error,
            class = ?class,
            transient = error.is_transient(),
            "Bootstrap run failed"
        );
        if self
            .transition(&BootstrapMachineInput::Fail, run_id)
            .is_err()
        {
            self.reset_fsm(Some(run_id));
            return self.route_failure(class, run_id).await;
        }

        let outcome = self.route_failure(class, run_id).await;
        if let Err(e) = self.transition(&BootstrapMachineInput::Recovered, run_id) {
            warn!(run_id = %run_id, error = %e, "Resetting bootstrap state");
            self.reset_fsm(Some(run_id));
        }
        outcome
    }

    async fn route_failure(&self, class: ErrorClass, run_id: &str) -> BootstrapOutcome {
        if class != ErrorClass::Timeout {
            self.timeout_streak.store(0, Ordering::SeqCst);
        }

        let target = match class {
            ErrorClass::Timeout => {
                let streak = self.timeout_streak.fetch_add(1, Ordering::SeqCst) + 1;
                if streak >= TIMEOUT_SURFACE_THRESHOLD {
                    NavigationTarget::error(ErrorViewKind::Timeout)
                } else {
                    NavigationTarget::DefaultEntry
                }
            }
            ErrorClass::UnconfirmedSession => NavigationTarget::DefaultEntry,
            ErrorClass::Network => NavigationTarget::error(ErrorViewKind::Network),
            ErrorClass::Auth => {
                self.lock.force_release();
                self.last_url.lock().take();
                if let Err(e) = self.exchange.store().clear_session().await {
                    warn!(run_id = %run_id, error = %e, "Failed to clear invalid session");
                }
                NavigationTarget::error(ErrorViewKind::SessionExpired)
            }
            ErrorClass::RecoverableByRetry
            | ErrorClass::RecoverableByFallback
            | ErrorClass::Unknown => NavigationTarget::error(ErrorViewKind::Unknown),
        };

        if !self.is_mounted() || !self.is_current(run_id) {
            info!(run_id = %run_id, "Bootstrap run no longer wanted, dropping failure route");
            return BootstrapOutcome::Discarded;
        }
        self.navigator.navigate(&target);
        info!(run_id = %run_id, target = %target, "Bootstrap failure routed");
        BootstrapOutcome::Navigated(target)
    }

    fn is_current(&self, run_id: &str) -> bool {
        self.active_run.lock().as_deref() == Some(run_id)
    }

    fn ensure_mounted(&self) -> BootstrapResult<()> {
        if self.is_mounted() {
            Ok(())
        } else {
            Err(BootstrapError::Unmounted)
        }
    }

    /// Transition the FSM and notify callback if state changed.
    fn transition(
        &self,
        input: &BootstrapMachineInput,
        run_id: &str,
    ) -> BootstrapResult<BootstrapState> {
        let active = self.active_run.lock();
        if active.as_deref() != Some(run_id) {
            return Err(BootstrapError::Superseded);
        }
        let mut fsm = self.fsm.lock();
        let old_state = BootstrapState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            BootstrapError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = BootstrapState::from(fsm.state());
        drop(fsm);
        drop(active);

        if old_state != new_state {
            debug!(
                run_id = %run_id,
                old_state = ?old_state,
                new_state = ?new_state,
                "Bootstrap state transition"
            );
            self.notify_state_change(new_state, Some(run_id));
        }

        Ok(new_state)
    }

    /// Put the FSM back to idle. A run that is no longer current leaves it
    /// alone so it cannot clobber a newer run.
    fn reset_fsm(&self, run_id: Option<&str>) {
        if run_id.is_some_and(|id| !self.is_current(id)) {
            return;
        }
        let mut fsm = self.fsm.lock();
        let was_idle = BootstrapState::from(fsm.state()) == BootstrapState::Idle;
        *fsm = BootstrapMachine::new();
        drop(fsm);
        if !was_idle {
            self.notify_state_change(BootstrapState::Idle, run_id);
        }
    }

    fn notify_state_change(&self, state: BootstrapState, run_id: Option<&str>) {
        let cb = self.state_callback.lock();
        if let Some(callback) = cb.as_ref() {
            callback(BootstrapStateChangedPayload {
                state,
                run_id: run_id.map(String::from),
            });
        }
    }
}

/// Cloneable handle for queueing triggers onto a started orchestrator.
#[derive(Clone)]
pub struct TriggerSender {
    sender: mpsc::Sender<QueuedTrigger>,
    guard: Arc<RedirectGuard>,
}

impl TriggerSender {
    /// Queue a trigger. Returns false if it was dropped because a run is in
    /// progress, the queue is full, or the loop has stopped.
    pub fn send(&self, trigger: BootstrapTrigger) -> bool {
        if self.guard.is_in_progress() {
            debug!(trigger = %trigger, "Bootstrap in progress, dropping trigger");
            return false;
        }
        let queued = QueuedTrigger {
            trigger,
            epoch: self.guard.epoch(),
        };
        match self.sender.try_send(queued) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Failed to queue bootstrap trigger");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_display_is_redacted() {
        let trigger = BootstrapTrigger::DeepLink(
            "lastbite://auth/callback#access_token=SECRET_A&refresh_token=SECRET_B".into(),
        );
        let shown = format!("{} {:?}", trigger, trigger);
        assert!(!shown.contains("SECRET_A"));
        assert!(!shown.contains("SECRET_B"));
        assert!(shown.contains("lastbite://auth/callback"));
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = BootstrapSnapshot {
            state: BootstrapState::Idle,
            in_progress: false,
            lock_held: false,
            mounted: true,
            timeout_streak: 0,
            last_url: None,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"], "idle");
        assert!(json.get("last_url").is_none());
    }
}
