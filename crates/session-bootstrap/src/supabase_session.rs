//! Supabase GoTrue-backed [`SessionStore`].
//!
//! `set_session` mirrors the JS client: a still-valid access token is checked
//! against `/auth/v1/user` and kept alongside the given refresh token, while
//! an expired one is replaced by redeeming the refresh token. Redemption is
//! single-use on the server.

use crate::error::{SessionStoreError, SessionStoreErrorKind, SessionStoreResult};
use crate::session::{Session, SessionStore};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// GoTrue error bodies use different fields across versions.
#[derive(Debug, Default, Deserialize)]
struct GoTrueErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl GoTrueErrorBody {
    fn parse(body: &str) -> String {
        let parsed: GoTrueErrorBody = serde_json::from_str(body).unwrap_or_default();
        parsed
            .error_description
            .or(parsed.msg)
            .or(parsed.message)
            .or(parsed.error)
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct JwtClaims {
    #[serde(default)]
    exp: Option<i64>,
}

/// Read the `exp` claim from a JWT without verifying it.
pub fn jwt_expiry(access_token: &str) -> Option<DateTime<Utc>> {
    let payload = access_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: JwtClaims = serde_json::from_slice(&bytes).ok()?;
    Utc.timestamp_opt(claims.exp?, 0).single()
}

/// Map a provider failure onto a store error kind. Message text is checked
/// first because GoTrue reports a consumed token as a plain 400.
pub fn classify_provider_error(status: Option<u16>, message: &str) -> SessionStoreErrorKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("invalid refresh token") || lower.contains("refresh token not found") {
        return SessionStoreErrorKind::RefreshTokenConsumed;
    }
    if lower.contains("network request failed")
        || lower.contains("failed to fetch")
        || lower.contains("network error")
    {
        return SessionStoreErrorKind::Network;
    }
    match status {
        Some(401) | Some(403) => SessionStoreErrorKind::Unauthorized,
        _ => SessionStoreErrorKind::Other,
    }
}

pub struct SupabaseSessionStore {
    http_client: Client,
    supabase_url: String,
    publishable_key: String,
    session: RwLock<Option<Session>>,
}

impl SupabaseSessionStore {
    pub fn new(supabase_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            supabase_url: supabase_url.into().trim_end_matches('/').to_string(),
            publishable_key: publishable_key.into(),
            session: RwLock::new(None),
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.supabase_url, path)
    }

    async fn failure(&self, response: reqwest::Response, context: &str) -> SessionStoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let body_summary = summarize_response_body(&body);
        let message = GoTrueErrorBody::parse(&body);
        let kind = classify_provider_error(Some(status.as_u16()), &message);
        warn!(
            status = %status,
            body_summary = %body_summary,
            kind = ?kind,
            "{} failed",
            context
        );
        let message = if message.is_empty() {
            format!("HTTP {}", status)
        } else {
            message
        };
        SessionStoreError::new(kind, format!("{}: {}", context, message))
    }

    /// Redeem a refresh token for a fresh pair.
    async fn refresh(&self, refresh_token: &str) -> SessionStoreResult<Session> {
        let response = self
            .http_client
            .post(self.auth_url("token?grant_type=refresh_token"))
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json")
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.failure(response, "Token refresh").await);
        }

        let data: TokenResponse = response.json().await?;
        let expires_at = data
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs))
            .or_else(|| jwt_expiry(&data.access_token));

        info!(user_id = %data.user.id, "Refresh token redeemed");
        Ok(Session {
            access_token: data.access_token,
            refresh_token: data.refresh_token,
            user_id: data.user.id,
            email: data.user.email,
            expires_at,
        })
    }

    /// Confirm an access token with the server and return its user.
    async fn fetch_user(&self, access_token: &str) -> SessionStoreResult<UserResponse> {
        let response = self
            .http_client
            .get(self.auth_url("user"))
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.failure(response, "User lookup").await);
        }

        let user: UserResponse = response.json().await?;
        debug!(user_id = %user.id, "Access token verified with server");
        Ok(user)
    }
}

#[async_trait]
impl SessionStore for SupabaseSessionStore {
    async fn get_session(&self) -> SessionStoreResult<Option<Session>> {
        Ok(self.session.read().await.clone())
    }

    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> SessionStoreResult<Session> {
        let expires_at = jwt_expiry(access_token);
        let still_valid = expires_at.is_some_and(|at| at > Utc::now());

        let session = if still_valid {
            let user = self.fetch_user(access_token).await?;
            Session {
                access_token: access_token.to_string(),
                refresh_token: refresh_token.to_string(),
                user_id: user.id,
                email: user.email,
                expires_at,
            }
        } else {
            debug!("Access token expired or unreadable, redeeming refresh token");
            self.refresh(refresh_token).await?
        };

        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    async fn clear_session(&self) -> SessionStoreResult<()> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };

        // Server-side revocation is best effort; the local session is gone.
        let result = self
            .http_client
            .post(self.auth_url("logout"))
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) if response.status() == StatusCode::UNAUTHORIZED => {}
            Ok(response) => warn!(status = %response.status(), "Logout request rejected"),
            Err(e) => warn!(error = %e, "Logout request failed"),
        }
        info!(user_id = %session.user_id, "Session cleared");
        Ok(())
    }
}
