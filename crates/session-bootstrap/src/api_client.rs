//! Lastbite REST API client for the user endpoints bootstrap needs.

use crate::error::{ApiError, ApiResult};
use crate::profile::{ProfileApi, UserProfile};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, warn};

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

#[derive(Clone)]
pub struct ApiClient {
    http_client: Client,
    api_url: String,
}

impl ApiClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn users_url(&self, path: &str) -> String {
        format!("{}/users/{}", self.api_url, path)
    }

    async fn get_user(&self, path: &str, access_token: &str) -> ApiResult<UserProfile> {
        let response = self
            .http_client
            .get(self.users_url(path))
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            warn!(
                status = %status,
                body_summary = %body_summary,
                endpoint = %path,
                "User request failed"
            );
            return Err(ApiError::from_status(
                status.as_u16(),
                format!("GET /users/{}: {} ({})", path, status, body_summary),
            ));
        }

        let profile: UserProfile = response.json().await?;
        debug!(endpoint = %path, user_id = %profile.id, "Fetched user");
        Ok(profile)
    }
}

#[async_trait]
impl ProfileApi for ApiClient {
    async fn get_me(&self, access_token: &str) -> ApiResult<UserProfile> {
        self.get_user("me", access_token).await
    }

    async fn get_profile(&self, access_token: &str) -> ApiResult<UserProfile> {
        self.get_user("profile", access_token).await
    }
}
