//! Request and response values exchanged with the dispatcher
//!
//! [`ApiRequest`] is an immutable description of one call. The dispatcher
//! never mutates it; retry bookkeeping lives in [`Attempt`], which borrows
//! the request, so a descriptor can be reused or shared freely.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AtelierError, Result};

/// How many times a request may be resubmitted after a 401.
pub const MAX_AUTH_RETRIES: u8 = 1;

/// Description of an outbound API call.
///
/// `path` is relative to the configured base URL. Headers given here are
/// sent as-is, except `Authorization`, which the dispatcher owns.
///
/// # Examples
///
/// ```
/// use atelier::api::ApiRequest;
///
/// let request = ApiRequest::post("/Order")
///     .json(&serde_json::json!({"boutiqueId": 7, "style": "kaftan"}))
///     .unwrap()
///     .header("X-Client", "cli");
///
/// assert_eq!(request.method().as_str(), "POST");
/// assert_eq!(request.path(), "/Order");
/// assert!(request.body().is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    headers: Vec<(String, String)>,
}

impl ApiRequest {
    /// Creates a request with no body and no extra headers.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    /// `GET path`
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST path`
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT path`
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `PATCH path`
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// `DELETE path`
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Parses a method name such as `"get"` or `"POST"`.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::InvalidRequest`] for names that are not valid
    /// HTTP methods.
    pub fn parse(method: &str, path: impl Into<String>) -> Result<Self> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| AtelierError::InvalidRequest(format!("invalid HTTP method: {method}")))?;
        Ok(Self::new(method, path))
    }

    /// Sets the JSON body from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::Serialization`] if `body` cannot be
    /// represented as JSON.
    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(AtelierError::Serialization)?;
        Ok(self.with_body(value))
    }

    /// Sets the JSON body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the base URL.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// JSON body, if any.
    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    /// Extra headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

/// One submission of a borrowed [`ApiRequest`], tracking whether it has
/// already been resubmitted after a 401.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Attempt<'a> {
    request: &'a ApiRequest,
    auth_retries: u8,
}

impl<'a> Attempt<'a> {
    /// The first submission.
    pub(crate) fn first(request: &'a ApiRequest) -> Self {
        Self {
            request,
            auth_retries: 0,
        }
    }

    pub(crate) fn request(&self) -> &'a ApiRequest {
        self.request
    }

    /// `true` if a 401 on this attempt may still be recovered from.
    pub(crate) fn can_retry_auth(&self) -> bool {
        self.auth_retries < MAX_AUTH_RETRIES
    }

    /// The resubmission that follows a recovered 401.
    pub(crate) fn retried(self) -> Self {
        Self {
            request: self.request,
            auth_retries: self.auth_retries + 1,
        }
    }

    pub(crate) fn is_retry(&self) -> bool {
        self.auth_retries > 0
    }
}

/// Buffered response from a successful call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ApiResponse {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`AtelierError::Serialization`] if the body does not match
    /// `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body).map_err(AtelierError::Serialization)?)
    }
}
