//! Atelier - authenticated storefront API client
//!
//! This library provides the HTTP client core of the boutique marketplace
//! storefront: credential storage, automatic access-token refresh, and
//! coordination of concurrent requests that hit an expired token.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `api`: request dispatcher with transparent 401 recovery
//! - `auth`: token store, refresh operation, single-flight coordinator,
//!   session events, login/logout
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli` / `commands`: command-line front end
//!
//! # Example
//!
//! ```no_run
//! use atelier::{ApiClient, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let client = ApiClient::from_config(&config)?;
//!     let boutiques: serde_json::Value = client.get_json("/Boutique").await?;
//!     println!("{boutiques}");
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use api::{ApiClient, ApiRequest, ApiResponse};
pub use auth::{SessionEvent, TokenKey, TokenStore};
pub use config::Config;
pub use error::{AtelierError, Result};
