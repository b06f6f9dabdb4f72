//! Authenticated session and the store that owns it.

use crate::error::SessionStoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

/// An authenticated session held by the auth backend client.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub email: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Returns true if the access token has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Auth backend client surface used by bootstrap.
///
/// `set_session` redeems the refresh token, which the backend accepts only
/// once; a second redemption fails with
/// [`SessionStoreErrorKind::RefreshTokenConsumed`](crate::SessionStoreErrorKind::RefreshTokenConsumed).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current session, if any.
    async fn get_session(&self) -> SessionStoreResult<Option<Session>>;

    /// Establish a session from a token pair.
    async fn set_session(&self, access_token: &str, refresh_token: &str)
        -> SessionStoreResult<Session>;

    /// Drop the current session.
    async fn clear_session(&self) -> SessionStoreResult<()>;
}
