//! # Session Bootstrap
//!
//! Turns an OAuth deep-link callback (or an app start with an existing
//! session) into exactly one navigation decision.
//!
//! A run checks the exchange lock, reuses an existing session or redeems
//! the tokens from the link fragment, confirms the session after a settle
//! delay, fetches the user profile and maps it to a destination. Overlapping
//! triggers are collapsed by a redirect guard and a last-URL memo.

pub mod api_client;
pub mod bootstrap_fsm;
pub mod deep_link;
pub mod error;
pub mod orchestrator;
pub mod profile;
pub mod redirect;
pub mod redirect_guard;
pub mod session;
pub mod session_exchange;
pub mod session_lock;
pub mod supabase_session;

pub use api_client::ApiClient;
pub use bootstrap_fsm::{
    BootstrapMachine, BootstrapMachineInput, BootstrapMachineState, BootstrapState,
    BootstrapStateChangedPayload,
};
pub use deep_link::{extract_tokens, redact_url, DeepLinkTokens};
pub use error::{
    ApiError, ApiErrorKind, ApiResult, BootstrapError, BootstrapResult, ErrorClass,
    SessionStoreError, SessionStoreErrorKind, SessionStoreResult, TimeoutStage,
};
pub use orchestrator::{
    BootstrapOrchestrator, BootstrapOutcome, BootstrapSnapshot, BootstrapStateCallback,
    BootstrapTrigger, IgnoreReason, TriggerSender, TIMEOUT_SURFACE_THRESHOLD,
};
pub use profile::{ProfileApi, ProfileFetcher, Role, UserProfile, PROFILE_FETCH_TIMEOUT};
pub use redirect::{decide, ErrorView, ErrorViewKind, NavigationTarget, Navigator, RedirectTarget};
pub use redirect_guard::{RedirectGuard, RedirectGuardToken};
pub use session::{Session, SessionStore};
pub use session_exchange::{SessionExchange, SETTLE_DELAY};
pub use session_lock::{SessionLock, SessionLockLease, LOCK_POLL_INTERVAL, LOCK_WAIT_TIMEOUT};
pub use supabase_session::SupabaseSessionStore;
