//! Bootstrap error types.
//!
//! Provider-specific failures are translated into typed kinds at the adapter
//! boundary ([`SessionStoreError`], [`ApiError`]); the orchestrator only ever
//! matches on kinds and on [`ErrorClass`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// What went wrong talking to the auth backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStoreErrorKind {
    /// The single-use refresh token was already redeemed.
    RefreshTokenConsumed,
    /// The backend rejected the credentials (401/403).
    Unauthorized,
    /// Connectivity failure.
    Network,
    /// Anything else.
    Other,
}

/// Error returned by a [`crate::SessionStore`].
#[derive(Error, Debug, Clone)]
#[error("Session store error ({kind:?}): {message}")]
pub struct SessionStoreError {
    pub kind: SessionStoreErrorKind,
    pub message: String,
}

impl SessionStoreError {
    pub fn new(kind: SessionStoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_refresh_token_consumed(&self) -> bool {
        self.kind == SessionStoreErrorKind::RefreshTokenConsumed
    }
}

impl From<reqwest::Error> for SessionStoreError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_connect() || e.is_timeout() {
            SessionStoreErrorKind::Network
        } else if matches!(e.status().map(|s| s.as_u16()), Some(401) | Some(403)) {
            SessionStoreErrorKind::Unauthorized
        } else {
            SessionStoreErrorKind::Other
        };
        Self::new(kind, e.to_string())
    }
}

/// Result type for session store operations.
pub type SessionStoreResult<T> = Result<T, SessionStoreError>;

/// What went wrong talking to the REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// HTTP 409: two requests raced to create the same user row.
    Conflict,
    /// HTTP 401.
    Unauthorized,
    /// Connectivity failure.
    Network,
    /// Anything else, including other HTTP statuses and decode failures.
    Other,
}

/// Error returned by a [`crate::ProfileApi`].
#[derive(Error, Debug, Clone)]
#[error("API error ({kind:?}, status {status:?}): {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Build an error from a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            409 => ApiErrorKind::Conflict,
            401 => ApiErrorKind::Unauthorized,
            _ => ApiErrorKind::Other,
        };
        Self {
            kind,
            status: Some(status),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            return Self::new(ApiErrorKind::Network, e.to_string());
        }
        match e.status() {
            Some(status) => Self::from_status(status.as_u16(), e.to_string()),
            None => Self::new(ApiErrorKind::Other, e.to_string()),
        }
    }
}

/// Result type for REST API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Which bounded wait expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStage {
    /// Waiting for another run's session to become visible.
    LockWait,
    /// Fetching the user profile.
    ProfileFetch,
}

impl fmt::Display for TimeoutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutStage::LockWait => write!(f, "Waiting for session"),
            TimeoutStage::ProfileFetch => write!(f, "Profile fetch"),
        }
    }
}

/// Error taxonomy used for routing failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Consumed refresh token while a session already exists elsewhere.
    RecoverableByRetry,
    /// Profile creation race, resolved through the read-only endpoint.
    RecoverableByFallback,
    /// A bounded wait expired.
    Timeout,
    /// Connectivity failure.
    Network,
    /// The session is genuinely invalid.
    Auth,
    /// The exchange reported success but the session never became visible.
    UnconfirmedSession,
    /// Anything else.
    Unknown,
}

/// Bootstrap error type.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// Auth backend failure
    #[error(transparent)]
    SessionStore(#[from] SessionStoreError),

    /// REST API failure
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A bounded wait expired
    #[error("{0} timed out")]
    Timeout(TimeoutStage),

    /// Exchange succeeded but the session was not visible after settling
    #[error("Session could not be confirmed after exchange")]
    UnconfirmedSession,

    /// Invalid state transition in the bootstrap FSM
    #[error("Invalid bootstrap state transition: {0}")]
    InvalidStateTransition(String),

    /// The consuming screen was torn down mid-run
    #[error("Bootstrap target is no longer mounted")]
    Unmounted,

    /// Sign-out or a newer run replaced this run while it was suspended
    #[error("Bootstrap run was superseded")]
    Superseded,
}

impl BootstrapError {
    /// Map this error onto the routing taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            BootstrapError::SessionStore(e) => match e.kind {
                // Only reaches here when no session turned up on re-check.
                SessionStoreErrorKind::RefreshTokenConsumed => ErrorClass::Auth,
                SessionStoreErrorKind::Unauthorized => ErrorClass::Auth,
                SessionStoreErrorKind::Network => ErrorClass::Network,
                SessionStoreErrorKind::Other => ErrorClass::Unknown,
            },
            BootstrapError::Api(e) => match e.kind {
                ApiErrorKind::Conflict => ErrorClass::RecoverableByFallback,
                ApiErrorKind::Unauthorized => ErrorClass::Auth,
                ApiErrorKind::Network => ErrorClass::Network,
                ApiErrorKind::Other => ErrorClass::Unknown,
            },
            BootstrapError::Timeout(_) => ErrorClass::Timeout,
            BootstrapError::UnconfirmedSession => ErrorClass::UnconfirmedSession,
            BootstrapError::InvalidStateTransition(_)
            | BootstrapError::Unmounted
            | BootstrapError::Superseded => ErrorClass::Unknown,
        }
    }

    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self.class(), ErrorClass::Network | ErrorClass::Timeout)
    }
}

/// Result type alias using BootstrapError.
pub type BootstrapResult<T> = Result<T, BootstrapError>;
