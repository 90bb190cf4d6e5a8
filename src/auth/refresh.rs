//! Access token refresh
//!
//! Exchanges the stored refresh token for a new access token with a single
//! `POST` to the refresh endpoint. The refresh token travels as the bearer
//! credential and the request has no body. On success the new access token
//! is written to the [`TokenStore`] exactly once and returned.
//!
//! Every failure is reported as [`AtelierError::RefreshFailed`]; stored
//! tokens are left alone and nothing is retried here. Clearing credentials
//! after a failed round is the coordinator's job.

use serde::Deserialize;

use crate::auth::token_store::{TokenKey, TokenStore};
use crate::error::{AtelierError, Result};

/// Performs one refresh round-trip.
///
/// The coordinator is generic over this trait so single-flight behaviour
/// can be tested without a server.
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Obtains, persists, and returns a new access token.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::RefreshFailed`] on any failure.
    async fn refresh(&self) -> Result<String>;
}

/// Refresh endpoint response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
}

/// [`TokenRefresher`] that calls the backend's refresh endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    http: reqwest::Client,
    endpoint: url::Url,
    store: TokenStore,
}

impl HttpTokenRefresher {
    /// Creates a refresher posting to `endpoint`.
    ///
    /// # Arguments
    ///
    /// * `http` - Shared HTTP client (carries the configured timeout).
    /// * `endpoint` - Absolute URL of the refresh endpoint.
    /// * `store` - Source of the refresh token and sink for the new access
    ///   token.
    pub fn new(http: reqwest::Client, endpoint: url::Url, store: TokenStore) -> Self {
        Self {
            http,
            endpoint,
            store,
        }
    }

    /// The refresh endpoint URL.
    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self) -> Result<String> {
        let refresh_token = self.store.refresh_token().ok_or_else(|| {
            AtelierError::RefreshFailed("no refresh token stored".to_string())
        })?;

        tracing::debug!(endpoint = %self.endpoint, "requesting new access token");

        let resp = self
            .http
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .bearer_auth(&refresh_token)
            .send()
            .await
            .map_err(|e| AtelierError::RefreshFailed(format!("refresh request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AtelierError::RefreshFailed(format!(
                "refresh endpoint returned {status}: {body}"
            ))
            .into());
        }

        let raw: RefreshResponse = resp.json().await.map_err(|e| {
            AtelierError::RefreshFailed(format!("failed to parse refresh response: {e}"))
        })?;

        self.store.save(TokenKey::AccessToken, &raw.access_token);
        tracing::info!("access token refreshed");
        Ok(raw.access_token)
    }
}
