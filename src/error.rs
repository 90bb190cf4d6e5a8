//! Error types for Atelier
//!
//! This module defines all error types used throughout the client,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Atelier operations
///
/// Functions return [`Result`] (an `anyhow::Result`), so callers that need
/// to branch on the failure class use `err.downcast_ref::<AtelierError>()`.
#[derive(Error, Debug)]
pub enum AtelierError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request descriptor could not be turned into an HTTP request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Network unreachable, timeout, or an unreadable response
    #[error("Transport error: {0}")]
    Transport(String),

    /// The access token was rejected (HTTP 401) on a first attempt
    ///
    /// Produced while classifying responses; `ApiClient::send` always
    /// recovers from it or turns it into another error.
    #[error("Access token expired")]
    AuthExpired,

    /// The refresh endpoint rejected the refresh token or was unreachable
    ///
    /// Terminal: stored credentials are cleared and a forced logout is
    /// signalled.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The refresh this request was waiting on was cancelled mid-flight
    ///
    /// Credentials are kept and the session continues; retrying the request
    /// starts a new refresh.
    #[error("Token refresh abandoned before completion")]
    RefreshAbandoned,

    /// Non-success HTTP status surfaced unchanged
    #[error("Server returned HTTP {status}: {body}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response body text (may be empty)
        body: String,
    },

    /// Login was rejected or returned an unusable payload
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl AtelierError {
    /// Returns the HTTP status carried by a [`AtelierError::Server`] error.
    pub fn status(&self) -> Option<u16> {
        match self {
            AtelierError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` for errors that end the user's session.
    pub fn is_terminal_auth(&self) -> bool {
        matches!(self, AtelierError::RefreshFailed(_))
    }
}

/// Result type alias for Atelier operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
