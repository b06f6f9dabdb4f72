//! Token exchange with consumed-token recovery and post-exchange settling.

use crate::deep_link::DeepLinkTokens;
use crate::error::{BootstrapError, BootstrapResult, TimeoutStage};
use crate::session::{Session, SessionStore};
use crate::session_lock::{LOCK_POLL_INTERVAL, LOCK_WAIT_TIMEOUT};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Pause between a successful exchange and re-reading the session.
pub const SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// Drives a [`SessionStore`] through the exchange protocol.
#[derive(Clone)]
pub struct SessionExchange {
    store: Arc<dyn SessionStore>,
}

impl SessionExchange {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Redeem the token pair.
    ///
    /// A consumed refresh token is only fatal when no session exists: another
    /// run may already have redeemed it.
    pub async fn exchange(&self, tokens: &DeepLinkTokens) -> BootstrapResult<Session> {
        match self
            .store
            .set_session(&tokens.access_token, &tokens.refresh_token)
            .await
        {
            Ok(session) => {
                debug!(user_id = %session.user_id, "Token exchange succeeded");
                Ok(session)
            }
            Err(e) if e.is_refresh_token_consumed() => {
                info!("Refresh token already consumed, re-checking session");
                match self.store.get_session().await? {
                    Some(session) => {
                        info!(user_id = %session.user_id, "Session already established elsewhere");
                        Ok(session)
                    }
                    None => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Wait [`SETTLE_DELAY`] and confirm the session is queryable.
    pub async fn settle_and_verify(&self) -> BootstrapResult<Session> {
        tokio::time::sleep(SETTLE_DELAY).await;
        match self.store.get_session().await? {
            Some(session) => Ok(session),
            None => {
                warn!("Session not visible after settle delay");
                Err(BootstrapError::UnconfirmedSession)
            }
        }
    }

    /// Poll for a session established by another run.
    ///
    /// Returns [`BootstrapError::Unmounted`] as soon as `mounted` goes false,
    /// and a lock-wait timeout after [`LOCK_WAIT_TIMEOUT`].
    pub async fn wait_for_session(&self, mounted: &AtomicBool) -> BootstrapResult<Session> {
        let deadline = Instant::now() + LOCK_WAIT_TIMEOUT;
        loop {
            if !mounted.load(Ordering::SeqCst) {
                return Err(BootstrapError::Unmounted);
            }
            if let Some(session) = self.store.get_session().await? {
                return Ok(session);
            }
            if Instant::now() + LOCK_POLL_INTERVAL > deadline {
                warn!(
                    waited_ms = LOCK_WAIT_TIMEOUT.as_millis() as u64,
                    "Gave up waiting for session from lock holder"
                );
                return Err(BootstrapError::Timeout(TimeoutStage::LockWait));
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }
    }
}
