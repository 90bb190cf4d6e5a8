//! Login and logout
//!
//! Login posts the user's credentials to the backend and stores the
//! returned token pair; logout clears it. Both announce the change on the
//! [`SessionSignal`]. Login deliberately bypasses the refresh-on-401
//! dispatcher: a rejected password is a login failure, not an expired
//! session.

use serde::{Deserialize, Serialize};

use crate::auth::session::{SessionEvent, SessionSignal};
use crate::auth::token_store::{TokenKey, TokenStore};
use crate::error::{AtelierError, Result};

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
}

/// Session entry and exit points.
///
/// Usually obtained from [`crate::api::ApiClient::auth`] so that it shares
/// the client's store and signal.
#[derive(Debug, Clone)]
pub struct AuthService {
    http: reqwest::Client,
    login_url: url::Url,
    store: TokenStore,
    signal: SessionSignal,
}

impl AuthService {
    /// Creates a service posting logins to `login_url`.
    pub fn new(
        http: reqwest::Client,
        login_url: url::Url,
        store: TokenStore,
        signal: SessionSignal,
    ) -> Self {
        Self {
            http,
            login_url,
            store,
            signal,
        }
    }

    /// Exchanges email and password for a token pair and stores it.
    ///
    /// # Errors
    ///
    /// - [`AtelierError::Authentication`] when the backend rejects the
    ///   credentials (400/401/403) or returns no usable tokens.
    /// - [`AtelierError::Server`] for other non-success statuses.
    /// - [`AtelierError::Transport`] when the backend is unreachable.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.login_url.clone())
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(|e| AtelierError::Transport(format!("login request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                400 | 401 | 403 => AtelierError::Authentication(format!(
                    "login rejected ({status}): {body}"
                )),
                code => AtelierError::Server { status: code, body },
            }
            .into());
        }

        let tokens: LoginResponse = resp.json().await.map_err(|e| {
            AtelierError::Authentication(format!("failed to parse login response: {e}"))
        })?;

        self.store.save(TokenKey::AccessToken, &tokens.access_token);
        self.store.save(TokenKey::RefreshToken, &tokens.refresh_token);
        tracing::info!("logged in");
        self.signal.emit(SessionEvent::LoggedIn);
        Ok(())
    }

    /// Clears stored credentials. Safe to call when already logged out.
    pub fn logout(&self) {
        self.store.clear_all();
        tracing::info!("logged out");
        self.signal.emit(SessionEvent::LoggedOut);
    }

    /// `true` when an access token is stored.
    pub fn is_authenticated(&self) -> bool {
        self.store.access_token().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_for(server: &MockServer) -> (AuthService, TokenStore, SessionSignal) {
        let store = TokenStore::in_memory();
        let signal = SessionSignal::new();
        let url = url::Url::parse(&format!("{}/User/login", server.uri())).unwrap();
        let service = AuthService::new(reqwest::Client::new(), url, store.clone(), signal.clone());
        (service, store, signal)
    }

    #[tokio::test]
    async fn test_login_stores_both_tokens_and_signals() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/User/login"))
            .and(body_json(
                serde_json::json!({"email": "ada@example.com", "password": "pw"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"accessToken": "A1", "refreshToken": "R1"}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let (service, store, signal) = service_for(&server);
        let mut events = signal.subscribe();

        service.login("ada@example.com", "pw").await.unwrap();

        assert_eq!(store.access_token().as_deref(), Some("A1"));
        assert_eq!(store.refresh_token().as_deref(), Some("R1"));
        assert!(service.is_authenticated());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedIn);
    }

    /// Log sink shared between the subscriber and the assertions.
    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_login_does_not_log_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/User/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"accessToken": "A1", "refreshToken": "R1"}),
            ))
            .mount(&server)
            .await;

        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_env_filter("atelier=trace")
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (service, _, _) = service_for(&server);
        service.login("ada@example.com", "pw").await.unwrap();

        let output = logs.contents();
        assert!(output.contains("logged in"), "got: {output}");
        assert!(!output.contains("ada@example.com"), "got: {output}");
    }

    #[tokio::test]
    async fn test_login_rejected_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let (service, store, _) = service_for(&server);
        let err = service.login("ada@example.com", "wrong").await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AtelierError>(),
            Some(AtelierError::Authentication(_))
        ));
        assert!(store.access_token().is_none());
    }

    #[tokio::test]
    async fn test_login_server_failure_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (service, _, _) = service_for(&server);
        let err = service.login("ada@example.com", "pw").await.unwrap_err();
        let status = err.downcast_ref::<AtelierError>().and_then(|e| e.status());
        assert_eq!(status, Some(503));
    }

    #[tokio::test]
    async fn test_login_missing_refresh_token_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"accessToken": "A1"})),
            )
            .mount(&server)
            .await;

        let (service, store, _) = service_for(&server);
        assert!(service.login("ada@example.com", "pw").await.is_err());
        assert!(store.access_token().is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_tokens_and_signals() {
        let server = MockServer::start().await;
        let (service, store, signal) = service_for(&server);
        store.save(TokenKey::AccessToken, "A1");
        store.save(TokenKey::RefreshToken, "R1");
        let mut events = signal.subscribe();

        service.logout();

        assert!(!service.is_authenticated());
        assert!(store.refresh_token().is_none());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedOut);
    }
}
