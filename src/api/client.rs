//! Authenticated request dispatcher
//!
//! [`ApiClient`] sends [`ApiRequest`]s to the backend and recovers from one
//! failure class on its own: an expired access token. The flow for every
//! call is:
//!
//! 1. Attach `Authorization: Bearer <accessToken>` when a token is stored;
//!    otherwise send without it.
//! 2. On `401 Unauthorized` for a request that has not been resubmitted yet,
//!    obtain a new token through the shared [`RefreshCoordinator`] and send
//!    the request again, once.
//! 3. A 401 on the resubmission is returned as
//!    [`AtelierError::Server`] with status 401; no second refresh happens.
//! 4. Every other failure is returned unchanged.
//!
//! When the refresh itself fails, the caller receives
//! [`AtelierError::RefreshFailed`] and subscribers of [`ApiClient::subscribe`]
//! see [`SessionEvent::ForcedLogout`].

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::api::request::{ApiRequest, ApiResponse, Attempt};
use crate::auth::coordinator::RefreshCoordinator;
use crate::auth::refresh::{HttpTokenRefresher, TokenRefresher};
use crate::auth::service::AuthService;
use crate::auth::session::{SessionEvent, SessionSignal};
use crate::auth::token_store::TokenStore;
use crate::config::Config;
use crate::error::{AtelierError, Result};

/// Failure reason for a 401 that arrives after the session was cleared.
const SESSION_ENDED: &str = "session ended";

/// Appends `path` to `base`, keeping any path prefix `base` already has.
///
/// [`url::Url::join`] would drop the prefix for absolute paths, which is
/// not what a base such as `https://host/api` wants.
///
/// # Examples
///
/// ```
/// use atelier::api::client::endpoint_url;
///
/// let base = url::Url::parse("https://shop.example.com/api/").unwrap();
/// let url = endpoint_url(&base, "/User/login").unwrap();
/// assert_eq!(url.as_str(), "https://shop.example.com/api/User/login");
/// ```
///
/// # Errors
///
/// Returns [`AtelierError::InvalidRequest`] if the result is not a valid URL.
pub fn endpoint_url(base: &url::Url, path: &str) -> Result<url::Url> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url::Url::parse(&joined)
        .map_err(|e| AtelierError::InvalidRequest(format!("invalid URL {joined}: {e}")).into())
}

/// HTTP client core shared by every caller of the backend API.
///
/// Cloning is cheap; clones share the token store, the refresh coordinator,
/// and the session signal, so single-flight refresh holds across all of
/// them.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: url::Url,
    login_url: url::Url,
    store: TokenStore,
    coordinator: Arc<RefreshCoordinator>,
    signal: SessionSignal,
}

impl ApiClient {
    /// Builds a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::Config`] if the configured URLs are invalid
    /// or the HTTP client cannot be constructed.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.api.timeout())
            .build()
            .map_err(|e| AtelierError::Config(format!("failed to build HTTP client: {e}")))?;

        let base_url = url::Url::parse(&config.api.base_url).map_err(|e| {
            AtelierError::Config(format!("Invalid base_url {}: {e}", config.api.base_url))
        })?;

        Self::with_http(
            http,
            base_url,
            &config.api.refresh_path,
            &config.api.login_path,
            config.storage.token_store(),
        )
    }

    /// Builds a client around an existing HTTP client and token store, using
    /// the backend's refresh endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::InvalidRequest`] if the endpoint paths do not
    /// form valid URLs with `base_url`.
    pub fn with_http(
        http: reqwest::Client,
        base_url: url::Url,
        refresh_path: &str,
        login_path: &str,
        store: TokenStore,
    ) -> Result<Self> {
        let refresh_url = endpoint_url(&base_url, refresh_path)?;
        let login_url = endpoint_url(&base_url, login_path)?;
        let refresher = Arc::new(HttpTokenRefresher::new(
            http.clone(),
            refresh_url,
            store.clone(),
        ));
        Ok(Self::with_refresher(http, base_url, login_url, store, refresher))
    }

    /// Builds a client with a caller-supplied refresh operation.
    pub fn with_refresher(
        http: reqwest::Client,
        base_url: url::Url,
        login_url: url::Url,
        store: TokenStore,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        let signal = SessionSignal::new();
        let coordinator = Arc::new(RefreshCoordinator::new(
            refresher,
            store.clone(),
            signal.clone(),
        ));
        Self {
            http,
            base_url,
            login_url,
            store,
            coordinator,
            signal,
        }
    }

    /// Sends `request`, transparently recovering from one expired access
    /// token.
    ///
    /// # Errors
    ///
    /// - [`AtelierError::Transport`] when the server cannot be reached or
    ///   the body cannot be read.
    /// - [`AtelierError::RefreshFailed`] when a 401 could not be recovered
    ///   because the refresh was rejected, or because the session had
    ///   already ended when the 401 arrived.
    /// - [`AtelierError::RefreshAbandoned`] when the shared refresh was
    ///   cancelled before it finished.
    /// - [`AtelierError::Server`] for any other non-success status,
    ///   including a 401 on the resubmitted request.
    /// - [`AtelierError::InvalidRequest`] when the descriptor cannot be
    ///   turned into an HTTP request.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut attempt = Attempt::first(request);
        let mut token = self.store.access_token();

        loop {
            let response = self.execute(&attempt, token.as_deref()).await?;

            match Self::check_status(response, &attempt) {
                Err(AtelierError::AuthExpired) => {
                    tracing::debug!(path = request.path(), "401, recovering access token");
                    attempt = attempt.retried();
                    token = Some(self.recover(token.as_deref()).await?);
                }
                outcome => return outcome.map_err(Into::into),
            }
        }
    }

    /// `GET path`, deserializing the JSON response.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(&ApiRequest::get(path)).await?.json()
    }

    /// `POST path` with a JSON body, deserializing the JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(&ApiRequest::post(path).json(body)?).await?.json()
    }

    /// `PUT path` with a JSON body, deserializing the JSON response.
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(&ApiRequest::put(path).json(body)?).await?.json()
    }

    /// `DELETE path`.
    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.send(&ApiRequest::delete(path)).await
    }

    /// Subscribes to session events, including forced logouts.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.signal.subscribe()
    }

    /// Login/logout operations sharing this client's store and signal.
    pub fn auth(&self) -> AuthService {
        AuthService::new(
            self.http.clone(),
            self.login_url.clone(),
            self.store.clone(),
            self.signal.clone(),
        )
    }

    /// The credential store used by this client.
    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    /// The refresh coordinator shared by clones of this client.
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &url::Url {
        &self.base_url
    }

    /// Returns the token to resend with after a 401.
    ///
    /// If the stored token already differs from the one that was rejected,
    /// another caller refreshed in the meantime and that token is reused.
    /// If it is gone, the session already ended while the request was in
    /// flight; no new round is started, so the forced logout is not
    /// signalled twice.
    async fn recover(&self, rejected: Option<&str>) -> Result<String> {
        if let Some(rejected) = rejected {
            match self.store.access_token() {
                Some(current) if current != rejected => {
                    tracing::debug!("access token rotated while request was in flight");
                    return Ok(current);
                }
                None => {
                    tracing::debug!("session ended while request was in flight");
                    return Err(AtelierError::RefreshFailed(SESSION_ENDED.to_string()).into());
                }
                Some(_) => {}
            }
        }
        self.coordinator.refresh().await
    }

    async fn execute(&self, attempt: &Attempt<'_>, token: Option<&str>) -> Result<ApiResponse> {
        let request = attempt.request();
        let url = endpoint_url(&self.base_url, request.path())?;
        let headers = Self::build_headers(request, token)?;

        let mut builder = self
            .http
            .request(request.method().clone(), url)
            .headers(headers);
        if let Some(body) = request.body() {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await.map_err(|e| {
            AtelierError::Transport(format!(
                "{} {} failed: {e}",
                request.method(),
                request.path()
            ))
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            AtelierError::Transport(format!("failed to read response body: {e}"))
        })?;

        tracing::debug!(
            method = %request.method(),
            path = request.path(),
            status = status.as_u16(),
            retry = attempt.is_retry(),
            "request completed"
        );

        Ok(ApiResponse::new(status, headers, body))
    }

    fn build_headers(request: &ApiRequest, token: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (name, value) in request.headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| AtelierError::InvalidRequest(format!("invalid header name: {name}")))?;
            if name == AUTHORIZATION {
                continue;
            }
            let value = HeaderValue::from_str(value).map_err(|_| {
                AtelierError::InvalidRequest(format!("invalid value for header {name}"))
            })?;
            headers.insert(name, value);
        }

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| AtelierError::InvalidRequest("invalid access token".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        Ok(headers)
    }

    /// Classifies a response. A 401 on a first attempt is
    /// [`AtelierError::AuthExpired`]; on a resubmission it is a plain
    /// [`AtelierError::Server`] error.
    fn check_status(
        response: ApiResponse,
        attempt: &Attempt<'_>,
    ) -> std::result::Result<ApiResponse, AtelierError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            if attempt.can_retry_auth() {
                return Err(AtelierError::AuthExpired);
            }
            tracing::debug!(path = attempt.request().path(), "401 after refresh, giving up");
        }

        Err(AtelierError::Server {
            status: status.as_u16(),
            body: response.text(),
        })
    }
}
