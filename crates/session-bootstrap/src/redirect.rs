//! Role routing: maps a fetched profile to where the user should land.

use crate::profile::{Role, UserProfile};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Destination chosen by [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectTarget {
    RoleSelection,
    CustomerSetup,
    CustomerHome,
    MerchantHome,
}

/// Decide where a user lands after sign-in.
///
/// Evaluated in order:
/// 1. No profile, or a profile without id: role selection.
/// 2. Role missing or unrecognized: role selection.
/// 3. Customer:
///    - no phone, not complete and no name: the backend defaulted the role on
///      a fresh account, so let the user choose (role selection);
///    - complete, or a phone of at least ten characters: customer home;
///    - otherwise: customer setup.
/// 4. Store owner: merchant home.
///
/// Step 3's first rule cannot tell an auto-assigned role apart from a real
/// customer who has filled nothing in.
pub fn decide(profile: Option<&UserProfile>) -> RedirectTarget {
    let Some(profile) = profile.filter(|p| p.has_id()) else {
        return RedirectTarget::RoleSelection;
    };

    match profile.role() {
        Role::Customer => {
            if !profile.has_phone() && !profile.profile_complete && !profile.has_name() {
                RedirectTarget::RoleSelection
            } else if profile.profile_complete || profile.has_valid_phone() {
                RedirectTarget::CustomerHome
            } else {
                RedirectTarget::CustomerSetup
            }
        }
        Role::StoreOwner => RedirectTarget::MerchantHome,
        Role::Unknown => RedirectTarget::RoleSelection,
    }
}

/// Kind of failure shown on the retryable error view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorViewKind {
    Network,
    Timeout,
    SessionExpired,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorView {
    pub kind: ErrorViewKind,
    pub message: String,
}

impl ErrorView {
    pub fn new(kind: ErrorViewKind) -> Self {
        let message = match kind {
            ErrorViewKind::Network => "Check your connection and try again.",
            ErrorViewKind::Timeout => "This is taking longer than expected. Try again.",
            ErrorViewKind::SessionExpired => "Your session expired. Please sign in again.",
            ErrorViewKind::Unknown => "Something went wrong. Try again.",
        };
        Self {
            kind,
            message: message.to_string(),
        }
    }
}

/// Symbolic target handed to the navigation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum NavigationTarget {
    RoleSelection,
    CustomerSetup,
    CustomerHome,
    MerchantHome,
    DefaultEntry,
    RetryableErrorView(ErrorView),
}

impl NavigationTarget {
    pub fn error(kind: ErrorViewKind) -> Self {
        NavigationTarget::RetryableErrorView(ErrorView::new(kind))
    }
}

impl From<RedirectTarget> for NavigationTarget {
    fn from(target: RedirectTarget) -> Self {
        match target {
            RedirectTarget::RoleSelection => NavigationTarget::RoleSelection,
            RedirectTarget::CustomerSetup => NavigationTarget::CustomerSetup,
            RedirectTarget::CustomerHome => NavigationTarget::CustomerHome,
            RedirectTarget::MerchantHome => NavigationTarget::MerchantHome,
        }
    }
}

impl fmt::Display for NavigationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationTarget::RoleSelection => write!(f, "role_selection"),
            NavigationTarget::CustomerSetup => write!(f, "customer_setup"),
            NavigationTarget::CustomerHome => write!(f, "customer_home"),
            NavigationTarget::MerchantHome => write!(f, "merchant_home"),
            NavigationTarget::DefaultEntry => write!(f, "default_entry"),
            NavigationTarget::RetryableErrorView(view) => {
                write!(f, "retryable_error_view({:?})", view.kind)
            }
        }
    }
}

/// Performs the actual screen transition.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &NavigationTarget);
}
