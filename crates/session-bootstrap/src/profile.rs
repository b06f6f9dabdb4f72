//! User profile model and the bounded profile fetch.

use crate::error::{ApiErrorKind, ApiResult, BootstrapError, BootstrapResult, TimeoutStage};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on the whole profile fetch, fallback included.
pub const PROFILE_FETCH_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Minimum trimmed length for a phone number to count as onboarding data.
pub const MIN_PHONE_LEN: usize = 10;

/// Profile as returned by the REST API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub id: String,
    /// Empty for accounts without an email, e.g. some OAuth providers.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, alias = "profileComplete")]
    pub profile_complete: bool,
}

impl UserProfile {
    pub fn has_id(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Any non-blank phone value.
    pub fn has_phone(&self) -> bool {
        non_blank(self.phone.as_deref())
    }

    /// A phone value long enough to be a real number.
    pub fn has_valid_phone(&self) -> bool {
        self.phone
            .as_deref()
            .is_some_and(|p| p.trim().chars().count() >= MIN_PHONE_LEN)
    }

    pub fn has_name(&self) -> bool {
        non_blank(self.name.as_deref())
    }

    pub fn role(&self) -> Role {
        Role::normalize(self.role.as_deref())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// Normalized account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    StoreOwner,
    Unknown,
}

impl Role {
    /// Normalize a free-form role string. Case, surrounding whitespace and
    /// `-`/space separators are ignored; anything unrecognized is `Unknown`.
    pub fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Role::Unknown;
        };
        let normalized: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "customer" => Role::Customer,
            "store_owner" => Role::StoreOwner,
            _ => Role::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::StoreOwner => "store_owner",
            Role::Unknown => "unknown",
        }
    }
}

/// REST API surface the fetcher depends on.
#[async_trait]
pub trait ProfileApi: Send + Sync {
    /// Fetch (and on first call, create) the current user. May fail with 409
    /// when two requests race to create the same row.
    async fn get_me(&self, access_token: &str) -> ApiResult<UserProfile>;

    /// Read-only profile lookup. Safe to call at any time.
    async fn get_profile(&self, access_token: &str) -> ApiResult<UserProfile>;
}

/// Resolves the authenticated user's profile within [`PROFILE_FETCH_TIMEOUT`].
#[derive(Clone)]
pub struct ProfileFetcher {
    api: Arc<dyn ProfileApi>,
    timeout: Duration,
}

impl ProfileFetcher {
    pub fn new(api: Arc<dyn ProfileApi>) -> Self {
        Self {
            api,
            timeout: PROFILE_FETCH_TIMEOUT,
        }
    }

    /// Fetch the user, falling back to the read-only endpoint on conflict.
    pub async fn fetch_user(&self, access_token: &str) -> BootstrapResult<UserProfile> {
        match tokio::time::timeout(self.timeout, self.fetch_with_fallback(access_token)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Profile fetch timed out"
                );
                Err(BootstrapError::Timeout(TimeoutStage::ProfileFetch))
            }
        }
    }

    async fn fetch_with_fallback(&self, access_token: &str) -> BootstrapResult<UserProfile> {
        match self.api.get_me(access_token).await {
            Ok(profile) => {
                debug!(user_id = %profile.id, "Fetched current user");
                Ok(profile)
            }
            Err(e) if e.kind == ApiErrorKind::Conflict => {
                info!("User creation raced (409), reading profile instead");
                Ok(self.api.get_profile(access_token).await?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_role_normalization() {
        assert_eq!(Role::normalize(Some("customer")), Role::Customer);
        assert_eq!(Role::normalize(Some("  Customer ")), Role::Customer);
        assert_eq!(Role::normalize(Some("STORE_OWNER")), Role::StoreOwner);
        assert_eq!(Role::normalize(Some("store-owner")), Role::StoreOwner);
        assert_eq!(Role::normalize(Some("Store Owner")), Role::StoreOwner);
        assert_eq!(Role::normalize(Some("")), Role::Unknown);
        assert_eq!(Role::normalize(Some("weird_value")), Role::Unknown);
        assert_eq!(Role::normalize(None), Role::Unknown);
    }

    #[test]
    fn test_phone_checks() {
        let mut profile = UserProfile {
            phone: Some("123".into()),
            ..Default::default()
        };
        assert!(profile.has_phone());
        assert!(!profile.has_valid_phone());

        profile.phone = Some(" 11999999999 ".into());
        assert!(profile.has_valid_phone());

        profile.phone = Some("   ".into());
        assert!(!profile.has_phone());
    }

    #[test]
    fn test_deserialize_camel_case_flag() {
        let profile: UserProfile = serde_json::from_str(
            r#"{"id":"u1","email":"a@b.c","role":"customer","profileComplete":true}"#,
        )
        .unwrap();
        assert!(profile.profile_complete);
        assert_eq!(profile.role(), Role::Customer);
        assert!(profile.name.is_none());
    }

    #[test]
    fn test_null_email_is_accepted() {
        let profile: UserProfile = serde_json::from_str(
            r#"{"id":"u1","email":null,"phone":null,"role":"store_owner"}"#,
        )
        .unwrap();
        assert_eq!(profile.email, "");
        assert!(profile.phone.is_none());
        assert_eq!(crate::redirect::decide(Some(&profile)), crate::RedirectTarget::MerchantHome);
    }

    struct ScriptedApi {
        me: ApiResult<UserProfile>,
        me_delay: Duration,
        profile_calls: AtomicUsize,
    }

    #[async_trait]
    impl ProfileApi for ScriptedApi {
        async fn get_me(&self, _access_token: &str) -> ApiResult<UserProfile> {
            tokio::time::sleep(self.me_delay).await;
            self.me.clone()
        }

        async fn get_profile(&self, _access_token: &str) -> ApiResult<UserProfile> {
            self.profile_calls.fetch_add(1, Ordering::SeqCst);
            Ok(UserProfile {
                id: "u-fallback".into(),
                role: Some("customer".into()),
                ..Default::default()
            })
        }
    }

    fn scripted(me: ApiResult<UserProfile>, me_delay: Duration) -> Arc<ScriptedApi> {
        Arc::new(ScriptedApi {
            me,
            me_delay,
            profile_calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_falls_back_to_profile() {
        let api = scripted(Err(ApiError::from_status(409, "duplicate")), Duration::ZERO);
        let fetcher = ProfileFetcher::new(api.clone());

        let profile = fetcher.fetch_user("tok").await.unwrap();
        assert_eq!(profile.id, "u-fallback");
        assert_eq!(api.profile_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_do_not_fall_back() {
        let api = scripted(Err(ApiError::from_status(500, "boom")), Duration::ZERO);
        let fetcher = ProfileFetcher::new(api.clone());

        let err = fetcher.fetch_user("tok").await.unwrap_err();
        assert!(matches!(err, BootstrapError::Api(_)));
        assert_eq!(api.profile_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out() {
        let api = scripted(
            Ok(UserProfile::default()),
            PROFILE_FETCH_TIMEOUT + Duration::from_millis(1),
        );
        let fetcher = ProfileFetcher::new(api);

        let err = fetcher.fetch_user("tok").await.unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::Timeout(TimeoutStage::ProfileFetch)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_just_inside_bound_succeeds() {
        let api = scripted(
            Ok(UserProfile {
                id: "u1".into(),
                ..Default::default()
            }),
            PROFILE_FETCH_TIMEOUT - Duration::from_millis(1),
        );
        let fetcher = ProfileFetcher::new(api);
        assert_eq!(fetcher.fetch_user("tok").await.unwrap().id, "u1");
    }
}
